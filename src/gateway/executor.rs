//! Remote command execution
//!
//! The gateway's policy logic never talks to the network directly; dispatch
//! goes through the `RemoteExecutor` trait so everything above it can be
//! tested with a mock. The production implementation shells out to `ssh`
//! with key-based auth.
//!
//! Remote failures are data, not errors: unreachable host, remote auth
//! failure, and timeout all come back as a failed `ExecutionResult` with the
//! reason in `error`. A timeout hard-kills the spawned process rather than
//! leaving it orphaned.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Where and as whom to run a remote command
#[derive(Debug, Clone)]
pub struct HostTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub keyfile: Option<PathBuf>,
}

/// Outcome of one dispatch attempt.
///
/// `success` means the remote command ran and exited zero. A nonzero remote
/// exit is a successful gateway operation reporting command failure; a
/// gateway-level problem (unreachable, timeout) has `exit_code: None` and an
/// `error`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub(crate) fn failure(error: impl Into<String>, started: Instant) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            duration_ms: started.elapsed().as_millis() as u64,
            error: Some(error.into()),
        }
    }

    /// Whether this result is a timeout synthesized by the gateway
    pub fn timed_out(&self) -> bool {
        self.error
            .as_deref()
            .map(|e| e.starts_with("TIMEOUT"))
            .unwrap_or(false)
    }
}

/// Injected collaborator that runs a command on a remote host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, target: &HostTarget, command: &str, timeout: Duration) -> ExecutionResult;
}

/// Executor that dispatches over `ssh` with key-based auth
pub struct SshExecutor {
    /// Connection establishment budget, separate from the command timeout
    connect_timeout_secs: u64,
    strict_host_key_checking: bool,
}

impl SshExecutor {
    pub fn new() -> Self {
        Self {
            connect_timeout_secs: 10,
            strict_host_key_checking: true,
        }
    }

    /// Disable host-key verification; for lab networks where controllers are
    /// re-imaged often
    pub fn with_relaxed_host_keys(mut self) -> Self {
        self.strict_host_key_checking = false;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, target: &HostTarget, command: &str, timeout: Duration) -> ExecutionResult {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs))
            .arg("-o")
            .arg(if self.strict_host_key_checking {
                "StrictHostKeyChecking=yes"
            } else {
                "StrictHostKeyChecking=accept-new"
            })
            .arg("-p")
            .arg(target.port.to_string());

        if let Some(keyfile) = &target.keyfile {
            cmd.arg("-i").arg(keyfile);
        }

        cmd.arg(format!("{}@{}", target.user, target.host)).arg(command);

        debug!(host = %target.host, user = %target.user, "Dispatching remote command");
        run_process(cmd, timeout).await
    }
}

/// Spawn a process and wait for it, enforcing the timeout.
///
/// `kill_on_drop` is set before spawning; when the timeout fires, dropping
/// the wait future tears the child down, so no orphan survives the call.
pub(crate) async fn run_process(mut cmd: Command, timeout: Duration) -> ExecutionResult {
    let started = Instant::now();

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return ExecutionResult::failure(format!("spawn failed: {}", e), started),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => ExecutionResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            duration_ms: started.elapsed().as_millis() as u64,
            error: if output.status.success() {
                None
            } else {
                Some(format!(
                    "remote command exited with {}",
                    output
                        .status
                        .code()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string())
                ))
            },
        },
        Ok(Err(e)) => ExecutionResult::failure(format!("wait failed: {}", e), started),
        Err(_) => ExecutionResult::failure(
            format!("TIMEOUT after {:.1}s", timeout.as_secs_f64()),
            started,
        ),
    }
}
