// Project modules
use crate::docker_controller::container_name;

// External modules
use serde::{Deserialize, Serialize};

/*
 * Artificial delay applied to a node's traffic. One profile per node; the
 * shaper turns it into one command per network zone the node is attached to.
 */
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LatencyProfile {
    pub delay_ms: u64,
}

// Builds the shell-level shaping rules for one node. The commands are
// executed by the caller through a CommandRunner.
pub trait LatencyShaper: Send + Sync {
    fn build_rules(
        &self,
        node_name: &str,
        zones: &[String],
        latency: &LatencyProfile,
    ) -> Vec<String>;
}

/*
 * netem-based shaper. Each zone a node is attached to shows up inside the
 * container as its own interface, so one qdisc per zone delays the traffic
 * towards that zone only.
 */
pub struct TcShaper;

impl LatencyShaper for TcShaper {
    fn build_rules(
        &self,
        node_name: &str,
        zones: &[String],
        latency: &LatencyProfile,
    ) -> Vec<String> {
        zones
            .iter()
            .map(|zone| {
                format!(
                    "docker exec {} tc qdisc add dev {} root netem delay {}ms",
                    container_name(node_name),
                    zone,
                    latency.delay_ms
                )
            })
            .collect()
    }
}
