// External modules
use serde::{Deserialize, Serialize};

// Standard modules
use std::time::Duration;

/*
 * Tunable values shared by every simulated node. Parsing these from a CLI or
 * a config file is left to the embedding scenario; the library only carries
 * the struct so the values are injectable instead of hard-coded.
 */
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SimConfig {
    pub rpc_port: u16,                  // control port the chain daemons listen on
    pub transaction_fee: u64,           // per-transaction fee in satoshis
    pub rpc_retry_attempts: u32,        // transient-failure budget for execute_rpc
    pub rpc_default_timeout_secs: u64,  // reconnect timeout after a transport failure
    pub rpc_conflict_timeout_secs: u64, // reconnect timeout after a request-in-flight conflict
    pub poll_interval_secs: u64,        // fixed interval for readiness, stop and tip polling
    pub startup_grace_millis: u64,      // pause after container start, see SimNode::run
}

impl SimConfig {
    pub fn default_rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_default_timeout_secs)
    }

    pub fn conflict_rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_conflict_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_millis)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        let config = SimConfig {
            rpc_port: 18332,
            transaction_fee: 1_000,
            rpc_retry_attempts: 30,
            rpc_default_timeout_secs: 30,
            // Recovering from a stuck send is deliberately faster than
            // recovering from a dropped connection.
            rpc_conflict_timeout_secs: 10,
            poll_interval_secs: 1,
            startup_grace_millis: 200,
        };

        config
    }
}
