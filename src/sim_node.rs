// Project modules
use crate::chain_rpc::{PortProbe, RpcConnector, RpcError, RpcSession};
use crate::command_runner::CommandRunner;
use crate::docker_controller::{self, ContainerRuntime};
use crate::latency_shaper::LatencyShaper;
use crate::sim_clock::Clock;
use crate::sim_config::SimConfig;
use crate::tx_chain::{
    btc_to_satoshi, satoshi_to_btc_string, RecycleTxRequest, SpendTarget, TxAssembler, TxChain,
};

// External modules
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

// Standard modules
use std::sync::Arc;
use std::time::Duration;

// Name of the daemon log inside a node's data directory
const DAEMON_LOG_FILE: &str = "regtest/debug.log";

/*
 * Identity shared by every node role in the simulated network. Immutable
 * after construction; the name doubles as the container and address key.
 */
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NodeIdentity {
    pub name: String,    // unique identifier, used as container name
    pub group: String,   // logical partition, e.g. "public" or "private"
    pub address: String, // network address used in peer connection strings
    pub image: String,   // container image the node runs
}

/*
 * Failures surfaced by the node types. Rpc wraps the control-channel taxonomy
 * with the failing node's name; StopFailed is fatal to that node's teardown
 * because force-removing a live chain daemon can corrupt its on-disk state.
 */
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("rpc failure on node {node}: {source}")]
    Rpc { node: String, source: RpcError },

    #[error("could not stop node {node} gracefully: {source}")]
    StopFailed { node: String, source: RpcError },

    #[error("container operation failed on node {node}: {cause}")]
    Container { node: String, cause: anyhow::Error },

    #[error("latency shaping failed on node {node}: {cause}")]
    Latency { node: String, cause: anyhow::Error },

    #[error("transaction assembly failed on node {node}: {cause}")]
    TxAssembly { node: String, cause: anyhow::Error },

    #[error("node {node} has no tx chains yet")]
    NoTxChains { node: String },

    #[error("node {node} has no spend target yet")]
    NoSpendTarget { node: String },

    #[error("tx chain {index} on node {node} cannot cover the fee")]
    ChainExhausted { node: String, index: usize },
}

/*
 * The injectable collaborators a node needs. Bundled so scenario code can
 * build one set and hand a clone to every node; per-node state (session,
 * chains) never lives in here.
 */
#[derive(Clone)]
pub struct SimDeps {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub connector: Arc<dyn RpcConnector>,
    pub probe: Arc<dyn PortProbe>,
    pub clock: Arc<dyn Clock>,
    pub runner: Arc<dyn CommandRunner>,
    pub assembler: Arc<dyn TxAssembler>,
    pub shaper: Arc<dyn LatencyShaper>,
}

/*
 * Base removal shared by every role: delete the sandbox, nothing else. Roles
 * with a control channel (SimNode) gracefully stop the daemon first.
 */
pub fn remove_container(
    identity: &NodeIdentity,
    runtime: &dyn ContainerRuntime,
) -> Result<(), NodeError> {
    runtime
        .remove(&identity.name)
        .map_err(|cause| NodeError::Container {
            node: identity.name.clone(),
            cause,
        })
}

/*
 * A node running the simulated chain daemon. Owns its container, its control
 * session and its transaction-chain workload state exclusively; nothing here
 * is safe for concurrent use from multiple callers.
 */
pub struct SimNode {
    identity: NodeIdentity,
    path: String, // host data directory mounted into the container
    config: SimConfig,
    deps: SimDeps,
    session: Option<Box<dyn RpcSession>>,
    spend_target: Option<SpendTarget>,
    tx_chains: Vec<TxChain>,
    chain_cursor: usize,
}

impl SimNode {
    pub fn new(identity: NodeIdentity, path: String, config: SimConfig, deps: SimDeps) -> Self {
        let node = SimNode {
            identity,
            path,
            config,
            deps,
            session: None,
            spend_target: None,
            tx_chains: Vec::new(),
            chain_cursor: 0,
        };

        node
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn deps(&self) -> &SimDeps {
        &self.deps
    }

    pub fn tx_chains(&self) -> &[TxChain] {
        &self.tx_chains
    }

    pub fn chain_cursor(&self) -> usize {
        self.chain_cursor
    }

    pub fn spend_target(&self) -> Option<&SpendTarget> {
        self.spend_target.as_ref()
    }

    pub fn log_file(&self) -> String {
        format!("{}/{}", self.path.trim_end_matches('/'), DAEMON_LOG_FILE)
    }

    /*
     * Launch the backing container with the given initial outbound peer list.
     * Must be called once per instance. The grace sleep afterwards avoids a
     * request-in-flight error on the first RPC call against a daemon that is
     * still wiring up its listener.
     */
    pub fn run(&mut self, connect_to: &[String]) -> Result<(), NodeError> {
        let args: Vec<String> = connect_to
            .iter()
            .map(|address| format!("-connect={}", address))
            .collect();
        self.deps
            .runtime
            .start(&self.identity.name, &self.identity.image, &args)
            .map_err(|cause| NodeError::Container {
                node: self.identity.name.clone(),
                cause,
            })?;

        self.deps.clock.sleep(self.config.startup_grace());
        Ok(())
    }

    pub fn is_running(&self) -> Result<bool, NodeError> {
        self.deps
            .runtime
            .is_running(&self.identity.name)
            .map_err(|cause| NodeError::Container {
                node: self.identity.name.clone(),
                cause,
            })
    }

    /*
     * Graceful teardown. A daemon observed alive is asked to stop over RPC
     * first; a failure there is fatal for this node because the caller must
     * not fall back to force-deleting a live daemon. Once the container is
     * observed stopped the sandbox is deleted.
     */
    pub fn remove(&mut self) -> Result<(), NodeError> {
        if self.is_running()? {
            if let Err(source) = self.execute_rpc("stop", &[]) {
                debug!(
                    node = %self.identity.name,
                    error = %source,
                    "could not stop the daemon"
                );
                return Err(NodeError::StopFailed {
                    node: self.identity.name.clone(),
                    source,
                });
            }
        }

        debug!(node = %self.identity.name, "waiting for the container to stop");
        while self.is_running()? {
            self.deps.clock.sleep(self.config.poll_interval());
        }
        debug!(node = %self.identity.name, "container has stopped");

        remove_container(&self.identity, self.deps.runtime.as_ref())
    }

    pub fn delete_peers_file(&self) -> Result<(), NodeError> {
        self.deps
            .runtime
            .remove_peers_file(&self.identity.name)
            .map_err(|cause| NodeError::Container {
                node: self.identity.name.clone(),
                cause,
            })
    }

    // Fallback control path through the daemon's bundled CLI
    pub fn execute_cli(&self, args: &[&str]) -> Result<String, NodeError> {
        self.deps
            .runner
            .run(&docker_controller::cli_command(&self.identity.name, args))
            .map_err(|cause| NodeError::Container {
                node: self.identity.name.clone(),
                cause,
            })
    }

    /*
     * Block until the node is ready to serve RPC calls. Two phases, in order:
     * first loop until the control port accepts a TCP connection (a fresh
     * daemon opens the port before the RPC subsystem is up), then loop until
     * a trivial introspection call stops being rejected. Loops indefinitely
     * by design; only transport-level flakiness inside phase two can abort it
     * through the shared retry budget.
     */
    pub fn wait_until_ready(&mut self) -> Result<(), NodeError> {
        while !self
            .deps
            .probe
            .is_open(&self.identity.address, self.config.rpc_port)
        {
            debug!(node = %self.identity.name, "waiting until the control port is open");
        }

        loop {
            match self.execute_rpc("getnetworkinfo", &[]) {
                Ok(_) => break,
                Err(RpcError::Protocol { code, message }) => {
                    debug!(
                        node = %self.identity.name,
                        code,
                        message = %message,
                        "rpc subsystem not ready yet, retrying"
                    );
                    self.deps.clock.sleep(self.config.poll_interval());
                }
                Err(source) => {
                    return Err(NodeError::Rpc {
                        node: self.identity.name.clone(),
                        source,
                    })
                }
            }
        }

        Ok(())
    }

    /*
     * Resilient RPC execution. Transport failures and send conflicts tear
     * down and recreate the session and retry against a bounded budget; the
     * send-conflict path reconnects with the short timeout so recovery from a
     * stuck send is faster. Protocol rejections are never retried and leave
     * the session connected. An exhausted budget has no recoverable fallback:
     * the caller's supervisor decides what to do with RetriesExhausted.
     */
    pub fn execute_rpc(&mut self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let mut remaining = self.config.rpc_retry_attempts;
        loop {
            match self.call_once(method, params) {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() => {
                    if remaining == 0 {
                        break;
                    }
                    remaining -= 1;
                    // A stuck send recovers on the short timeout, a dropped
                    // connection on the default one
                    let timeout = match &error {
                        RpcError::RequestInFlight => self.config.conflict_rpc_timeout(),
                        _ => self.config.default_rpc_timeout(),
                    };
                    warn!(
                        node = %self.identity.name,
                        method,
                        error = %error,
                        "transient rpc failure, reconnecting and retrying"
                    );
                    self.reconnect(timeout);
                }
                Err(error) => return Err(error),
            }
        }

        error!(node = %self.identity.name, method, "rpc retry budget exhausted");
        Err(RpcError::RetriesExhausted {
            method: method.to_string(),
        })
    }

    // One attempt against the session, connecting lazily if necessary
    fn call_once(&mut self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        if self.session.is_none() {
            let session = self.deps.connector.connect(
                &self.identity.address,
                self.config.rpc_port,
                self.config.default_rpc_timeout(),
            )?;
            self.session = Some(session);
        }

        match self.session.as_mut() {
            Some(session) => session.call(method, params),
            None => Err(RpcError::Unexpected(String::from(
                "session missing after connect",
            ))),
        }
    }

    // Drop the session and connect again with the given timeout. A failed
    // reconnect leaves the session empty; the next attempt connects lazily
    // and its failure counts against the same budget.
    fn reconnect(&mut self, timeout: Duration) {
        self.session = None;
        match self
            .deps
            .connector
            .connect(&self.identity.address, self.config.rpc_port, timeout)
        {
            Ok(session) => self.session = Some(session),
            Err(error) => {
                debug!(
                    node = %self.identity.name,
                    error = %error,
                    "reconnect failed, retrying on the next attempt"
                );
            }
        }
    }

    fn rpc(&mut self, method: &str, params: &[Value]) -> Result<Value, NodeError> {
        self.execute_rpc(method, params)
            .map_err(|source| NodeError::Rpc {
                node: self.identity.name.clone(),
                source,
            })
    }

    fn rpc_string(&mut self, method: &str, params: &[Value]) -> Result<String, NodeError> {
        let value = self.rpc(method, params)?;
        match value {
            Value::String(text) => Ok(text),
            other => Err(NodeError::Rpc {
                node: self.identity.name.clone(),
                source: RpcError::Unexpected(format!("expected a string, got {}", other)),
            }),
        }
    }

    pub fn best_block_hash(&mut self) -> Result<String, NodeError> {
        self.rpc_string("getbestblockhash", &[])
    }

    /*
     * Request one fresh receiving address and its key from the node and
     * record the pair as the fixed second party of every future recycling
     * transaction.
     */
    pub fn set_spend_target(&mut self) -> Result<(), NodeError> {
        let address = self.rpc_string("getnewaddress", &[])?;
        let secret_key = self.rpc_string("dumpprivkey", &[Value::String(address.clone())])?;
        self.spend_target = Some(SpendTarget {
            address,
            secret_key,
        });

        Ok(())
    }

    /*
     * Seed one TxChain per currently unspent wallet output. Runs once before
     * steady-state generation; chains are append-only afterwards.
     */
    pub fn create_tx_chains(&mut self) -> Result<(), NodeError> {
        let unspent = self.rpc("listunspent", &[])?;
        let outputs = match unspent {
            Value::Array(outputs) => outputs,
            other => {
                return Err(NodeError::Rpc {
                    node: self.identity.name.clone(),
                    source: RpcError::Unexpected(format!("expected an array, got {}", other)),
                })
            }
        };

        for output in outputs {
            let txid = self.unspent_field_string(&output, "txid")?;
            let address = self.unspent_field_string(&output, "address")?;
            let amount_btc = match output.get("amount").and_then(Value::as_f64) {
                Some(amount) => amount,
                None => {
                    return Err(NodeError::Rpc {
                        node: self.identity.name.clone(),
                        source: RpcError::Unexpected(String::from(
                            "unspent output without a numeric amount",
                        )),
                    })
                }
            };
            let secret_key = self.rpc_string("dumpprivkey", &[Value::String(address.clone())])?;

            self.tx_chains.push(TxChain {
                current_unspent_tx: txid,
                address,
                secret_key,
                amount: btc_to_satoshi(amount_btc),
            });
        }

        Ok(())
    }

    fn unspent_field_string(&self, output: &Value, field: &str) -> Result<String, NodeError> {
        match output.get(field).and_then(Value::as_str) {
            Some(text) => Ok(text.to_string()),
            None => Err(NodeError::Rpc {
                node: self.identity.name.clone(),
                source: RpcError::Unexpected(format!("unspent output without a {}", field)),
            }),
        }
    }

    // Round-robin selection over the chain pool; wraps against the current
    // length, which only grows.
    fn next_chain_index(&mut self) -> Result<usize, NodeError> {
        if self.tx_chains.is_empty() {
            return Err(NodeError::NoTxChains {
                node: self.identity.name.clone(),
            });
        }

        let index = self.chain_cursor;
        self.chain_cursor = (self.chain_cursor + 1) % self.tx_chains.len();
        Ok(index)
    }

    /*
     * Steady-state unit of work. Spends the selected chain's current output
     * together with the spend target's output (outputs 0 and 1 of the
     * previous round's transaction) into two value-equal outputs paying each
     * party back, deducting half the fee from the chain's ledger: each round
     * the chain co-spends with, and co-pays for, the shared spend target.
     */
    pub fn generate_tx(&mut self) -> Result<String, NodeError> {
        let target = match &self.spend_target {
            Some(target) => target.clone(),
            None => {
                return Err(NodeError::NoSpendTarget {
                    node: self.identity.name.clone(),
                })
            }
        };
        let index = self.next_chain_index()?;
        let fee_share = self.config.transaction_fee / 2;

        let (prev_txid, chain_address, chain_secret_key, amount_in) = {
            let chain = &self.tx_chains[index];
            (
                chain.current_unspent_tx.clone(),
                chain.address.clone(),
                chain.secret_key.clone(),
                chain.amount,
            )
        };
        if amount_in <= fee_share {
            return Err(NodeError::ChainExhausted {
                node: self.identity.name.clone(),
                index,
            });
        }
        let amount_out = amount_in - fee_share;

        let request = RecycleTxRequest {
            prev_txid: &prev_txid,
            chain_address: &chain_address,
            chain_secret_key: &chain_secret_key,
            target_address: &target.address,
            target_secret_key: &target.secret_key,
            output_amount: amount_out,
        };
        let raw_tx = self
            .deps
            .assembler
            .assemble_recycle_tx(&request)
            .map_err(|cause| NodeError::TxAssembly {
                node: self.identity.name.clone(),
                cause,
            })?;

        debug!(
            node = %self.identity.name,
            amount_in,
            amount_out,
            fee = self.config.transaction_fee,
            chain = index,
            "submitting recycling transaction"
        );
        let tx_hash = self.rpc_string("sendrawtransaction", &[Value::String(raw_tx)])?;

        let chain = &mut self.tx_chains[index];
        chain.amount = amount_out;
        chain.current_unspent_tx = tx_hash.clone();
        info!(node = %self.identity.name, hash = %tx_hash, "sendrawtransaction succeeded");

        Ok(tx_hash)
    }

    /*
     * One-shot maturation pass converting coinbase-restricted balances into
     * generally spendable ones. Each chain's balance is split into two
     * spendable halves (one back to the chain, one to the spend target) via
     * unsigned construction, remote signing and broadcast; afterwards the
     * steady-state two-input scheme can operate on outputs 0 and 1.
     */
    pub fn transfer_coinbases_to_normal_tx(&mut self) -> Result<(), NodeError> {
        let target = match &self.spend_target {
            Some(target) => target.clone(),
            None => {
                return Err(NodeError::NoSpendTarget {
                    node: self.identity.name.clone(),
                })
            }
        };
        let fee_share = self.config.transaction_fee / 2;

        for index in 0..self.tx_chains.len() {
            let (prev_txid, chain_address, amount) = {
                let chain = &self.tx_chains[index];
                (
                    chain.current_unspent_tx.clone(),
                    chain.address.clone(),
                    chain.amount,
                )
            };
            let halved = amount / 2;
            if halved <= fee_share {
                return Err(NodeError::ChainExhausted {
                    node: self.identity.name.clone(),
                    index,
                });
            }
            let new_amount = halved - fee_share;

            let inputs = json!([{ "txid": prev_txid, "vout": 0 }]);
            // Output order matters: the chain spends output 0 and the spend
            // target output 1 from here on.
            let mut outputs = Map::new();
            outputs.insert(
                chain_address,
                Value::String(satoshi_to_btc_string(new_amount)),
            );
            outputs.insert(
                target.address.clone(),
                Value::String(satoshi_to_btc_string(new_amount)),
            );

            let raw_tx =
                self.rpc_string("createrawtransaction", &[inputs, Value::Object(outputs)])?;
            let signed = self.rpc("signrawtransaction", &[Value::String(raw_tx)])?;
            let signed_hex = match signed.get("hex").and_then(Value::as_str) {
                Some(hex) => hex.to_string(),
                None => {
                    return Err(NodeError::Rpc {
                        node: self.identity.name.clone(),
                        source: RpcError::Unexpected(String::from(
                            "signrawtransaction response without a hex field",
                        )),
                    })
                }
            };
            let tx_hash = self.rpc_string("sendrawtransaction", &[Value::String(signed_hex)])?;

            let chain = &mut self.tx_chains[index];
            chain.amount = new_amount;
            chain.current_unspent_tx = tx_hash;
        }

        Ok(())
    }

    // Ask the node to mine exactly one block
    pub fn generate_block(&mut self) -> Result<(), NodeError> {
        debug!(node = %self.identity.name, "trying to generate block");
        let block_hash = self.rpc("generate", &[Value::from(1)])?;
        info!(node = %self.identity.name, hash = %block_hash, "generated block");

        Ok(())
    }
}
