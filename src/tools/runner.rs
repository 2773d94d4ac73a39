//! Running provisioned tools with a timeout.

use std::ffi::OsString;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ToolError;

use super::{ToolKind, ToolProvisioner, Verification};

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exited with status zero.
    pub success: bool,
    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Process was killed after exceeding its timeout.
    pub timed_out: bool,
}

impl CommandOutput {
    /// Builds the output for a process killed at its deadline.
    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: format!("timed out after {}s", timeout.as_secs()),
            timed_out: true,
        }
    }

    /// Builds the output for a process that could not be started.
    pub fn spawn_failed(error: &std::io::Error) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: format!("failed to start: {}", error),
            timed_out: false,
        }
    }

    fn from_output(output: &std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        }
    }

    /// Returns stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (_, true) => self.stdout.clone(),
            _ => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// Returns the last non-empty line of stderr, for log messages.
    pub fn last_error_line(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("no diagnostic output")
    }
}

/// Runs an external tool by kind.
///
/// `Err` means the tool itself is unavailable. A tool that runs and fails
/// is an `Ok` with `success == false`.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        tool: ToolKind,
        args: &[OsString],
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandOutput, ToolError>> + Send;
}

/// Spawns `program` and waits for it, killing it at the deadline.
pub(crate) async fn execute(
    program: &Path,
    args: &[OsString],
    timeout: Duration,
) -> std::io::Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %program.display(), args = ?args, "Running command");

    let child = cmd.spawn()?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(CommandOutput::from_output(&output?)),
        Err(_) => {
            warn!(
                program = %program.display(),
                timeout_secs = timeout.as_secs(),
                "Command timed out and was killed"
            );
            Ok(CommandOutput::timed_out(timeout))
        }
    }
}

/// Runs tools resolved through a [`ToolProvisioner`].
pub struct ToolRunner {
    provisioner: Arc<ToolProvisioner>,
}

impl ToolRunner {
    pub fn new(provisioner: Arc<ToolProvisioner>) -> Self {
        Self { provisioner }
    }
}

impl CommandRunner for ToolRunner {
    async fn run(
        &self,
        tool: ToolKind,
        args: &[OsString],
        timeout: Duration,
    ) -> Result<CommandOutput, ToolError> {
        let handle = self.provisioner.resolve(tool).await?;

        match execute(&handle.path, args, timeout).await {
            Ok(output) => Ok(output),
            Err(e) => {
                // The cached binary vanished or lost its exec bit.
                warn!(
                    tool = %tool,
                    path = %handle.path.display(),
                    error = %e,
                    "Cached tool failed to start, re-verifying"
                );
                let handle = self
                    .provisioner
                    .resolve_with(tool, Verification::Force)
                    .await?;
                Ok(execute(&handle.path, args, timeout)
                    .await
                    .unwrap_or_else(|e| CommandOutput::spawn_failed(&e)))
            }
        }
    }
}
