// External modules
use anyhow::{bail, Context};

// Standard modules
use std::process::Command;

/*
 * Shell-level execution seam. Container control, latency shaping and relay
 * introspection all reduce to one-line shell commands; routing them through
 * this trait keeps the node types testable without docker on the machine.
 */
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str) -> anyhow::Result<String>;
}

// Runs commands through `sh -c` and returns trimmed stdout
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str) -> anyhow::Result<String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .with_context(|| format!("failed to spawn `{}`", command))?;

        if !output.status.success() {
            bail!(
                "command `{}` exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
