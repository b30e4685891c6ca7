//! CLI adapter process runner.
//!
//! Probes and executes CLI adapters as child processes, wrapped per the
//! configured sandbox level. Executions are fully cancellable: a cancelled
//! invocation kills the child process best-effort.

use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SandboxSettings;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CliAdapterDescriptor, SandboxLevel};
use crate::services::sandbox::wrap_command;

use super::catalog::LOCAL_ECHO_ID;

/// Outcome of one CLI adapter invocation.
#[derive(Debug, Clone)]
pub struct CliExecution {
    pub stdout: String,
    pub exit_ok: bool,
    pub latency_ms: u64,
}

/// Runs CLI adapters under the configured sandbox.
#[derive(Clone)]
pub struct CliRunner {
    sandbox: SandboxSettings,
    sandbox_level: SandboxLevel,
}

impl CliRunner {
    pub fn new(sandbox: SandboxSettings) -> Self {
        let sandbox_level = match sandbox.mode.as_str() {
            "os-sandboxed" => SandboxLevel::OsSandboxed,
            "docker" | "apple-container" => SandboxLevel::Container,
            _ => SandboxLevel::BareCli,
        };
        Self {
            sandbox,
            sandbox_level,
        }
    }

    /// Probe an adapter with a short command and timeout. Internal adapters
    /// always probe successfully.
    pub async fn probe(&self, adapter: &CliAdapterDescriptor, timeout: Duration) -> bool {
        if adapter.is_internal {
            return true;
        }
        let result = tokio::time::timeout(
            timeout,
            Command::new(&adapter.probe_command)
                .args(&adapter.probe_args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => output.status.success(),
            Ok(Err(e)) => {
                debug!(adapter = %adapter.id, error = %e, "Adapter probe failed to spawn");
                false
            }
            Err(_) => {
                debug!(adapter = %adapter.id, "Adapter probe timed out");
                false
            }
        }
    }

    /// Execute an adapter with the rendered prompt.
    pub async fn execute(
        &self,
        adapter: &CliAdapterDescriptor,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> DomainResult<CliExecution> {
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        if adapter.is_internal {
            return Ok(Self::execute_internal(adapter, prompt));
        }

        let mut argv = vec![adapter.execute_command.clone()];
        argv.extend(adapter.render_execute_args(prompt));
        let argv = wrap_command(&argv, self.sandbox_level, &self.sandbox)?;

        let started = Instant::now();
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DomainError::AdapterFailed(format!("Failed to spawn {}: {e}", adapter.id))
            })?;

        let pid = child.id();

        // Drain stdout concurrently so a chatty child can't fill the pipe
        // and stall before exiting.
        let mut stdout_pipe = child.stdout.take().ok_or_else(|| {
            DomainError::AdapterFailed(format!("Failed to capture stdout of {}", adapter.id))
        })?;
        let reader = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = String::new();
            let _ = stdout_pipe.read_to_string(&mut buf).await;
            buf
        });

        tokio::select! {
            () = cancel.cancelled() => {
                Self::terminate(&mut child, pid).await;
                reader.abort();
                Err(DomainError::Cancelled)
            }
            status = child.wait() => {
                let status = status.map_err(|e| {
                    DomainError::AdapterFailed(format!("Adapter {} wait failed: {e}", adapter.id))
                })?;
                let stdout = reader.await.unwrap_or_default();
                Ok(CliExecution {
                    stdout,
                    exit_ok: status.success(),
                    latency_ms: started.elapsed().as_millis() as u64,
                })
            }
        }
    }

    /// In-process execution for internal adapters. Echoes a deterministic,
    /// non-empty response derived from the prompt.
    fn execute_internal(adapter: &CliAdapterDescriptor, prompt: &str) -> CliExecution {
        let first_line = prompt
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("(empty prompt)")
            .trim();
        let mut summary: String = first_line.chars().take(160).collect();
        if summary.is_empty() {
            summary.push_str("(empty prompt)");
        }
        CliExecution {
            stdout: format!("[{}] {}\n", adapter.id, summary),
            exit_ok: true,
            latency_ms: 0,
        }
    }

    async fn terminate(child: &mut tokio::process::Child, pid: Option<u32>) {
        if child.start_kill().is_err() {
            // Fall back to a direct signal when the handle is already gone
            if let Some(pid) = pid {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid as i32),
                    nix::sys::signal::Signal::SIGKILL,
                );
            }
        }
        if let Err(e) = child.wait().await {
            warn!(error = %e, "Failed to reap cancelled adapter child");
        }
    }
}
