// Project modules
use crate::latency_shaper::LatencyProfile;
use crate::sim_node::{NodeError, SimDeps, SimNode};

/*
 * Capability seams for role composition. A node is never "publicly reachable"
 * by inheritance; concrete types aggregate the PublicRole capability and
 * expose it through these traits.
 */
pub trait HasLatencyProfile {
    fn latency(&self) -> &LatencyProfile;
}

pub trait HasOutgoingPeers {
    fn outgoing_peers(&self) -> &[String];
    // Peer lists are mutable configuration before run and fixed afterwards
    fn add_outgoing_peer(&mut self, address: String);
}

/*
 * Capability carried by every publicly reachable node: a latency profile for
 * its traffic and the peers it will actively connect to at start.
 */
#[derive(Debug, Clone)]
pub struct PublicRole {
    pub latency: LatencyProfile,
    pub outgoing_peers: Vec<String>,
}

impl PublicRole {
    pub fn new(latency: LatencyProfile) -> Self {
        let role = PublicRole {
            latency,
            outgoing_peers: Vec::new(),
        };

        role
    }
}

// Builds the shaping rules for one node and executes each
pub(crate) fn apply_latency_rules(
    node_name: &str,
    latency: &LatencyProfile,
    zones: &[String],
    deps: &SimDeps,
) -> Result<(), NodeError> {
    for command in deps.shaper.build_rules(node_name, zones, latency) {
        deps.runner
            .run(&command)
            .map_err(|cause| NodeError::Latency {
                node: node_name.to_string(),
                cause,
            })?;
    }

    Ok(())
}

/*
 * A chain daemon that is part of the public network: SimNode plus the public
 * capability. Without an explicit peer list it connects to its configured
 * outgoing peers.
 */
pub struct PublicSimNode {
    node: SimNode,
    public: PublicRole,
}

impl PublicSimNode {
    pub fn new(node: SimNode, latency: LatencyProfile) -> Self {
        let public_node = PublicSimNode {
            node,
            public: PublicRole::new(latency),
        };

        public_node
    }

    pub fn node(&self) -> &SimNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut SimNode {
        &mut self.node
    }

    pub fn run(&mut self, connect_to: Option<&[String]>) -> Result<(), NodeError> {
        match connect_to {
            Some(addresses) => self.node.run(addresses),
            None => {
                let peers = self.public.outgoing_peers.clone();
                self.node.run(&peers)
            }
        }
    }

    pub fn apply_latency(&self, zones: &[String]) -> Result<(), NodeError> {
        apply_latency_rules(
            &self.node.identity().name,
            &self.public.latency,
            zones,
            self.node.deps(),
        )
    }
}

impl HasLatencyProfile for PublicSimNode {
    fn latency(&self) -> &LatencyProfile {
        &self.public.latency
    }
}

impl HasOutgoingPeers for PublicSimNode {
    fn outgoing_peers(&self) -> &[String] {
        &self.public.outgoing_peers
    }

    fn add_outgoing_peer(&mut self, address: String) {
        self.public.outgoing_peers.push(address);
    }
}

/*
 * A private chain daemon routed exclusively through a relay: without an
 * explicit peer list its single outbound peer is the relay's private address,
 * so it never sees the public network directly.
 */
pub struct SelfishSimNode {
    node: SimNode,
    relay_address: String,
}

impl SelfishSimNode {
    pub fn new(node: SimNode, relay_address: String) -> Self {
        let selfish_node = SelfishSimNode {
            node,
            relay_address,
        };

        selfish_node
    }

    pub fn node(&self) -> &SimNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut SimNode {
        &mut self.node
    }

    pub fn relay_address(&self) -> &str {
        &self.relay_address
    }

    pub fn run(&mut self, connect_to: Option<&[String]>) -> Result<(), NodeError> {
        match connect_to {
            Some(addresses) => self.node.run(addresses),
            None => {
                let peers = vec![self.relay_address.clone()];
                self.node.run(&peers)
            }
        }
    }
}
