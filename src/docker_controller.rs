// Project modules
use crate::command_runner::CommandRunner;

// Standard modules
use std::sync::Arc;

// Prefix shared by every container the simulation creates, so a wiped run can
// be cleaned up with a single name filter.
pub const CONTAINER_PREFIX: &str = "sim";

pub fn container_name(node_name: &str) -> String {
    format!("{}-{}", CONTAINER_PREFIX, node_name)
}

/*
 * Command line executed inside a node's container to reach the daemon over
 * its bundled CLI. Fallback control path next to the RPC session.
 */
pub fn cli_command(node_name: &str, args: &[&str]) -> String {
    format!(
        "docker exec {} bitcoin-cli -regtest -conf=/data/bitcoin.conf {}",
        container_name(node_name),
        args.join(" ")
    )
}

/*
 * Introspection command asking a relay container which block hash it is
 * currently advertising to the public network.
 */
pub fn relay_tip_command(node_name: &str) -> String {
    format!(
        "docker exec {} proxy-cli get-best-public-block-hash",
        container_name(node_name)
    )
}

/*
 * Sandbox lifecycle contract the node types depend on. The default
 * implementation shells out to docker; tests substitute a recording mock.
 */
pub trait ContainerRuntime: Send + Sync {
    fn start(&self, name: &str, image: &str, args: &[String]) -> anyhow::Result<()>;
    fn is_running(&self, name: &str) -> anyhow::Result<bool>;
    fn remove(&self, name: &str) -> anyhow::Result<()>;
    fn remove_peers_file(&self, name: &str) -> anyhow::Result<()>;
}

// Controls containers by running docker CLI commands
pub struct DockerController {
    runner: Arc<dyn CommandRunner>,
}

impl DockerController {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        let controller = DockerController { runner };

        controller
    }
}

impl ContainerRuntime for DockerController {
    fn start(&self, name: &str, image: &str, args: &[String]) -> anyhow::Result<()> {
        self.runner.run(&format!(
            "docker run --detach --name {} {} {}",
            container_name(name),
            image,
            args.join(" ")
        ))?;

        Ok(())
    }

    fn is_running(&self, name: &str) -> anyhow::Result<bool> {
        let state = self.runner.run(&format!(
            "docker inspect --format {{{{.State.Running}}}} {}",
            container_name(name)
        ))?;

        Ok(state == "true")
    }

    fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.runner
            .run(&format!("docker rm {}", container_name(name)))?;

        Ok(())
    }

    fn remove_peers_file(&self, name: &str) -> anyhow::Result<()> {
        self.runner.run(&format!(
            "docker exec {} rm -f /data/regtest/peers.dat",
            container_name(name)
        ))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names_carry_the_shared_prefix() {
        assert_eq!(container_name("alice"), "sim-alice");
        assert!(cli_command("alice", &["getblockcount"]).starts_with("docker exec sim-alice"));
        assert!(relay_tip_command("proxy").contains("sim-proxy"));
    }
}
