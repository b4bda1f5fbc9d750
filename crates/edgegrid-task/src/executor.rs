//! Running the upgrade tool.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{TaskError, TaskResult};

/// Runs an external program to completion.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> TaskResult<()>;
}

/// Executes commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, program: &str, args: &[String]) -> TaskResult<()> {
        debug!(%program, ?args, "running command");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| TaskError::Command(format!("{program}: {e}")))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(TaskError::Command(format!(
            "{program} {}: {}: {}",
            args.join(" "),
            output.status,
            stderr.trim()
        )))
    }
}
