// Project modules
use crate::docker_controller;
use crate::latency_shaper::LatencyProfile;
use crate::node_roles::{apply_latency_rules, HasLatencyProfile, HasOutgoingPeers, PublicRole};
use crate::sim_clock::Clock;
use crate::sim_config::SimConfig;
use crate::sim_node::{remove_container, NodeError, NodeIdentity, SimDeps, SimNode};

// External modules
use tracing::debug;

/*
 * A privileged public node bridging a private sub-network to the public
 * network. It exposes a public and a private address and can report which
 * block hash it is currently relaying publicly, which is how a scenario
 * detects that withheld blocks have been released.
 */
pub struct RelayNode {
    identity: NodeIdentity,
    private_address: String,
    args: Vec<String>, // extra relay process arguments, fixed at build time
    public: PublicRole,
    config: SimConfig,
    deps: SimDeps,
}

impl RelayNode {
    pub fn new(
        identity: NodeIdentity,
        private_address: String,
        args: Vec<String>,
        latency: LatencyProfile,
        config: SimConfig,
        deps: SimDeps,
    ) -> Self {
        let relay = RelayNode {
            identity,
            private_address,
            args,
            public: PublicRole::new(latency),
            config,
            deps,
        };

        relay
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn private_address(&self) -> &str {
        &self.private_address
    }

    // Launch the relay process seeded with a starting chain-tip hash
    pub fn run(&self, start_hash: &str) -> Result<(), NodeError> {
        let mut args = self.args.clone();
        args.push(format!("--start-hash={}", start_hash));
        self.deps
            .runtime
            .start(&self.identity.name, &self.identity.image, &args)
            .map_err(|cause| NodeError::Container {
                node: self.identity.name.clone(),
                cause,
            })
    }

    // The block hash the relay currently advertises to the public network
    pub fn best_public_block_hash(&self) -> Result<String, NodeError> {
        self.deps
            .runner
            .run(&docker_controller::relay_tip_command(&self.identity.name))
            .map_err(|cause| NodeError::Container {
                node: self.identity.name.clone(),
                cause,
            })
    }

    /*
     * Poll the relay until its advertised public tip matches the given node's
     * best block hash. Blocks the calling thread; loops until convergence.
     */
    pub fn wait_for_highest_tip_of(&self, node: &mut SimNode) -> Result<(), NodeError> {
        let target_hash = node.best_block_hash()?;
        self.deps.clock.sleep(self.config.poll_interval());
        while self.best_public_block_hash()? != target_hash {
            self.deps.clock.sleep(self.config.poll_interval());
            debug!(
                relay = %self.identity.name,
                target = %target_hash,
                "waiting for blocks to spread"
            );
        }

        Ok(())
    }

    pub fn apply_latency(&self, zones: &[String]) -> Result<(), NodeError> {
        apply_latency_rules(&self.identity.name, &self.public.latency, zones, &self.deps)
    }

    // The relay has no control channel of its own, so removal is direct
    pub fn remove(&self) -> Result<(), NodeError> {
        remove_container(&self.identity, self.deps.runtime.as_ref())
    }
}

impl HasLatencyProfile for RelayNode {
    fn latency(&self) -> &LatencyProfile {
        &self.public.latency
    }
}

impl HasOutgoingPeers for RelayNode {
    fn outgoing_peers(&self) -> &[String] {
        &self.public.outgoing_peers
    }

    fn add_outgoing_peer(&mut self, address: String) {
        self.public.outgoing_peers.push(address);
    }
}
