// Project modules
pub mod chain_rpc;
pub mod command_runner;
pub mod docker_controller;
pub mod latency_shaper;
pub mod node_roles;
pub mod relay_node;
pub mod sim_clock;
pub mod sim_config;
pub mod sim_node;
pub mod tx_chain;

#[cfg(test)]
pub(crate) mod test_support;

pub use chain_rpc::{PortProbe, RpcConnector, RpcError, RpcSession, TcpPortProbe};
pub use command_runner::{CommandRunner, ShellRunner};
pub use docker_controller::{ContainerRuntime, DockerController};
pub use latency_shaper::{LatencyProfile, LatencyShaper, TcShaper};
pub use node_roles::{
    HasLatencyProfile, HasOutgoingPeers, PublicRole, PublicSimNode, SelfishSimNode,
};
pub use relay_node::RelayNode;
pub use sim_clock::{Clock, SystemClock};
pub use sim_config::SimConfig;
pub use sim_node::{NodeError, NodeIdentity, SimDeps, SimNode};
pub use tx_chain::{RecycleTxRequest, SpendTarget, TxAssembler, TxChain};
