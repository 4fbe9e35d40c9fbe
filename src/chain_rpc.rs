// External modules
use serde_json::Value;
use thiserror::Error;

// Standard modules
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/*
 * Failure taxonomy for the node control channel. Transport and RequestInFlight
 * are transient and handled by the retry loop in SimNode::execute_rpc; a
 * Protocol error means the node received and rejected the call and is never
 * retried.
 */
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    // Raised when a new call is issued before the previous one finished
    // sending, a quirk of naive long-lived RPC connections.
    #[error("a request is already in flight on this connection")]
    RequestInFlight,

    #[error("node rejected the call (code {code}): {message}")]
    Protocol { code: i64, message: String },

    #[error("retry budget exhausted while calling {method}")]
    RetriesExhausted { method: String },

    #[error("unexpected response shape: {0}")]
    Unexpected(String),
}

impl RpcError {
    /*
     * True for the failure classes the retry loop is allowed to recover from.
     */
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::RequestInFlight)
    }
}

// A live connection to one node's control endpoint. Calls are strictly
// sequential; the session is not safe for concurrent use.
pub trait RpcSession: Send {
    fn call(&mut self, method: &str, params: &[Value]) -> Result<Value, RpcError>;
}

// Factory for control-channel sessions. The wire protocol behind the session
// is implementation-defined; the library only relies on the error taxonomy.
pub trait RpcConnector: Send + Sync {
    fn connect(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn RpcSession>, RpcError>;
}

/*
 * Lightweight TCP reachability check against a node's control port. A freshly
 * started daemon opens its listening port before the RPC subsystem is up, so
 * readiness waiting probes the port first and the RPC layer second.
 */
pub trait PortProbe: Send + Sync {
    fn is_open(&self, address: &str, port: u16) -> bool;
}

pub struct TcpPortProbe {
    pub timeout: Duration,
}

impl TcpPortProbe {
    pub fn new() -> Self {
        let probe = TcpPortProbe {
            timeout: Duration::from_secs(1),
        };

        probe
    }
}

impl Default for TcpPortProbe {
    fn default() -> Self {
        TcpPortProbe::new()
    }
}

impl PortProbe for TcpPortProbe {
    fn is_open(&self, address: &str, port: u16) -> bool {
        let addrs = match (address, port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(_) => return false,
        };
        for addr in addrs {
            if TcpStream::connect_timeout(&addr, self.timeout).is_ok() {
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_and_send_conflicts_are_transient() {
        let transport = RpcError::Transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ));
        assert!(transport.is_transient());
        assert!(RpcError::RequestInFlight.is_transient());

        let rejection = RpcError::Protocol {
            code: -6,
            message: String::from("insufficient funds"),
        };
        assert!(!rejection.is_transient());
        assert!(!RpcError::RetriesExhausted {
            method: String::from("getblockcount"),
        }
        .is_transient());
        assert!(!RpcError::Unexpected(String::from("not a string")).is_transient());
    }
}
