//! Shell command execution for workflow steps.

use anyhow::{bail, Result};
use tokio::process::Command;

/// Runs rendered command lines through the host interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRuntime;

impl ShellRuntime {
    pub fn new() -> Self {
        Self
    }

    /// Executes `command` via `sh -c`, returning the captured standard
    /// streams (stdout followed by stderr). A nonzero interpreter exit is an
    /// error carrying the captured output for debuggability.
    pub async fn run(&self, command: &str) -> Result<String> {
        let output = Command::new("sh").arg("-c").arg(command).output().await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            bail!("command failed ({}): {}", output.status, combined);
        }
        Ok(combined)
    }
}
