// Project modules
use crate::chain_rpc::{PortProbe, RpcConnector, RpcError, RpcSession};
use crate::command_runner::CommandRunner;
use crate::docker_controller::ContainerRuntime;
use crate::latency_shaper::TcShaper;
use crate::sim_clock::Clock;
use crate::sim_config::SimConfig;
use crate::sim_node::{NodeIdentity, SimDeps, SimNode};
use crate::tx_chain::{RecycleTxRequest, TxAssembler};

// External modules
use serde_json::Value;

// Standard modules
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/*
 * Scripted collaborators shared by the unit tests. All mocks record into the
 * same ordered log so tests can assert cross-collaborator ordering (e.g. the
 * graceful stop RPC happening before the container removal).
 */
pub struct Harness {
    pub log: Arc<Mutex<Vec<String>>>,
    pub script: Arc<Mutex<VecDeque<Result<Value, RpcError>>>>,
    pub calls: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
    pub connects: Arc<Mutex<Vec<Duration>>>,
    pub running: Arc<Mutex<VecDeque<bool>>>,
    pub port_checks: Arc<Mutex<VecDeque<bool>>>,
    pub probe_calls: Arc<Mutex<usize>>,
    pub sleeps: Arc<Mutex<Vec<Duration>>>,
    pub commands: Arc<Mutex<Vec<String>>>,
    pub command_outputs: Arc<Mutex<VecDeque<String>>>,
    pub assembled: Arc<Mutex<Vec<(String, u64)>>>,
}

impl Harness {
    pub fn new() -> Self {
        // One shared subscriber so node logs show up in failing test output
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();

        let harness = Harness {
            log: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            connects: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(Mutex::new(VecDeque::new())),
            port_checks: Arc::new(Mutex::new(VecDeque::new())),
            probe_calls: Arc::new(Mutex::new(0)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
            commands: Arc::new(Mutex::new(Vec::new())),
            command_outputs: Arc::new(Mutex::new(VecDeque::new())),
            assembled: Arc::new(Mutex::new(Vec::new())),
        };

        harness
    }

    pub fn deps(&self) -> SimDeps {
        SimDeps {
            runtime: Arc::new(MockRuntime {
                log: self.log.clone(),
                running: self.running.clone(),
            }),
            connector: Arc::new(MockConnector {
                log: self.log.clone(),
                script: self.script.clone(),
                calls: self.calls.clone(),
                connects: self.connects.clone(),
            }),
            probe: Arc::new(MockProbe {
                port_checks: self.port_checks.clone(),
                probe_calls: self.probe_calls.clone(),
            }),
            clock: Arc::new(MockClock {
                sleeps: self.sleeps.clone(),
            }),
            runner: Arc::new(MockRunner {
                commands: self.commands.clone(),
                command_outputs: self.command_outputs.clone(),
            }),
            assembler: Arc::new(MockAssembler {
                assembled: self.assembled.clone(),
            }),
            shaper: Arc::new(TcShaper),
        }
    }

    pub fn node(&self, name: &str) -> SimNode {
        let identity = NodeIdentity {
            name: name.to_string(),
            group: String::from("public"),
            address: format!("10.0.0.{}", name.len()),
            image: String::from("chain-daemon:latest"),
        };

        SimNode::new(
            identity,
            format!("/tmp/sim/{}", name),
            SimConfig::default(),
            self.deps(),
        )
    }

    pub fn push_ok(&self, value: Value) {
        self.script.lock().unwrap().push_back(Ok(value));
    }

    pub fn push_err(&self, error: RpcError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn push_running(&self, running: bool) {
        self.running.lock().unwrap().push_back(running);
    }

    pub fn push_port_check(&self, open: bool) {
        self.port_checks.lock().unwrap().push_back(open);
    }

    pub fn push_command_output(&self, output: &str) {
        self.command_outputs
            .lock()
            .unwrap()
            .push_back(output.to_string());
    }

    pub fn transport_error() -> RpcError {
        RpcError::Transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ))
    }
}

// Records lifecycle calls; is_running answers from a script, stopped once the
// script runs out.
struct MockRuntime {
    log: Arc<Mutex<Vec<String>>>,
    running: Arc<Mutex<VecDeque<bool>>>,
}

impl ContainerRuntime for MockRuntime {
    fn start(&self, name: &str, _image: &str, args: &[String]) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("start:{}:{}", name, args.join(",")));
        Ok(())
    }

    fn is_running(&self, _name: &str) -> anyhow::Result<bool> {
        Ok(self.running.lock().unwrap().pop_front().unwrap_or(false))
    }

    fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(format!("remove:{}", name));
        Ok(())
    }

    fn remove_peers_file(&self, name: &str) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("remove_peers:{}", name));
        Ok(())
    }
}

// Every connect hands out a session drawing from the shared script; calls
// past the end of the script succeed with Null.
struct MockConnector {
    log: Arc<Mutex<Vec<String>>>,
    script: Arc<Mutex<VecDeque<Result<Value, RpcError>>>>,
    calls: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
    connects: Arc<Mutex<Vec<Duration>>>,
}

impl RpcConnector for MockConnector {
    fn connect(
        &self,
        _address: &str,
        _port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn RpcSession>, RpcError> {
        self.connects.lock().unwrap().push(timeout);
        Ok(Box::new(ScriptedSession {
            log: self.log.clone(),
            script: self.script.clone(),
            calls: self.calls.clone(),
        }))
    }
}

struct ScriptedSession {
    log: Arc<Mutex<Vec<String>>>,
    script: Arc<Mutex<VecDeque<Result<Value, RpcError>>>>,
    calls: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
}

impl RpcSession for ScriptedSession {
    fn call(&mut self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        self.log.lock().unwrap().push(format!("rpc:{}", method));
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.to_vec()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Value::Null))
    }
}

// Answers from a script; an exhausted script means the port is open
struct MockProbe {
    port_checks: Arc<Mutex<VecDeque<bool>>>,
    probe_calls: Arc<Mutex<usize>>,
}

impl PortProbe for MockProbe {
    fn is_open(&self, _address: &str, _port: u16) -> bool {
        *self.probe_calls.lock().unwrap() += 1;
        self.port_checks.lock().unwrap().pop_front().unwrap_or(true)
    }
}

struct MockClock {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl Clock for MockClock {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

struct MockRunner {
    commands: Arc<Mutex<Vec<String>>>,
    command_outputs: Arc<Mutex<VecDeque<String>>>,
}

impl CommandRunner for MockRunner {
    fn run(&self, command: &str) -> anyhow::Result<String> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(self
            .command_outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

struct MockAssembler {
    assembled: Arc<Mutex<Vec<(String, u64)>>>,
}

impl TxAssembler for MockAssembler {
    fn assemble_recycle_tx(&self, request: &RecycleTxRequest<'_>) -> anyhow::Result<String> {
        self.assembled
            .lock()
            .unwrap()
            .push((request.prev_txid.to_string(), request.output_amount));
        Ok(String::from("raw-recycle-tx"))
    }
}
