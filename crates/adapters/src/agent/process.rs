// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-backed agent adapter.
//!
//! Spawns the configured binary in its own process group so a signal
//! to the group reliably terminates the agent and anything it spawned
//! (sandbox wrappers, shells). The group leader's PID is written to
//! `{pids_root}/{run_id}.pid` before the agent does work and removed
//! on clean exit; the pidfile is the recovery channel when the engine
//! restarts.

use super::output::parse_outcome;
use super::{AdapterError, AgentAdapter, InvocationOutcome, InvocationRequest};
use crate::pidfile;
use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use wave_config::{AdapterDef, OutputFormat};

/// How long a signalled child gets to exit before SIGKILL.
pub const TERM_GRACE: Duration = Duration::from_secs(5);

/// Adapter that runs a configured external binary per invocation.
#[derive(Debug, Clone)]
pub struct ProcessAgentAdapter {
    command: String,
    base_args: Vec<String>,
    output: OutputFormat,
    grace: Duration,
}

impl ProcessAgentAdapter {
    pub fn from_def(def: &AdapterDef) -> Self {
        Self {
            command: def.command.clone(),
            base_args: def.args.clone(),
            output: def.output,
            grace: TERM_GRACE,
        }
    }

    /// Override the SIGTERM grace window (tests shorten it).
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Compose the argument list for one invocation. Base args come
    /// from the adapter declaration; persona-resolved flags follow;
    /// the user prompt is the final positional argument.
    fn build_args(&self, request: &InvocationRequest) -> Vec<String> {
        let mut args = self.base_args.clone();
        if !request.system_prompt.is_empty() {
            args.push("--system-prompt".to_string());
            args.push(request.system_prompt.clone());
        }
        if let Some(model) = &request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(temperature) = request.temperature {
            args.push("--temperature".to_string());
            args.push(temperature.to_string());
        }
        if !request.allowed_tools.is_empty() {
            args.push("--allowed-tools".to_string());
            args.push(request.allowed_tools.join(","));
        }
        if !request.denied_tools.is_empty() {
            args.push("--disallowed-tools".to_string());
            args.push(request.denied_tools.join(","));
        }
        args.push(request.user_prompt.clone());
        args
    }

    /// SIGTERM the process group, wait up to the grace window, then
    /// SIGKILL. Reaps the child in all paths.
    async fn terminate_group(&self, pgid: i32, child: &mut Child) {
        let pid = Pid::from_raw(pgid);
        if let Err(e) = killpg(pid, Signal::SIGTERM) {
            tracing::warn!(pgid, error = %e, "SIGTERM to process group failed");
        }

        let graceful = tokio::time::timeout(self.grace, child.wait()).await;
        if graceful.is_err() {
            tracing::warn!(pgid, grace = ?self.grace, "grace window elapsed, sending SIGKILL");
            if let Err(e) = killpg(pid, Signal::SIGKILL) {
                tracing::warn!(pgid, error = %e, "SIGKILL to process group failed");
            }
            let _ = child.wait().await;
        }
    }
}

#[async_trait]
impl AgentAdapter for ProcessAgentAdapter {
    async fn invoke(
        &self,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> Result<InvocationOutcome, AdapterError> {
        let args = self.build_args(&request);
        tracing::info!(
            run_id = %request.run_id,
            step_id = %request.step_id,
            persona = %request.persona,
            command = %self.command,
            workdir = %request.workdir.display(),
            "spawning agent",
        );

        let mut child = Command::new(&self.command)
            .args(&args)
            .current_dir(&request.workdir)
            .envs(request.env.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|e| AdapterError::InvocationFailed(format!("{}: {}", self.command, e)))?;

        let pgid = child
            .id()
            .ok_or_else(|| AdapterError::InvocationFailed("child exited before spawn returned".into()))?
            as i32;

        pidfile::write(&request.pids_root, &request.run_id, pgid as u32)
            .map_err(|e| AdapterError::InvocationFailed(format!("pidfile write: {}", e)))?;

        // Drain both pipes concurrently to avoid blocking the child
        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| AdapterError::Stream("missing stdout pipe".into()))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| AdapterError::Stream("missing stderr pipe".into()))?;
        let stdout_task = tokio::spawn(async move {
            let mut buf = String::new();
            stdout_pipe.read_to_string(&mut buf).await.map(|_| buf)
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            stderr_pipe.read_to_string(&mut buf).await.map(|_| buf)
        });

        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| AdapterError::Stream(e.to_string()))?
            }
            _ = cancel.cancelled() => {
                tracing::info!(run_id = %request.run_id, step_id = %request.step_id, "cancelling agent");
                self.terminate_group(pgid, &mut child).await;
                let _ = pidfile::remove(&request.pids_root, &request.run_id);
                return Err(AdapterError::Cancelled);
            }
            _ = tokio::time::sleep(request.timeout) => {
                tracing::warn!(
                    run_id = %request.run_id,
                    step_id = %request.step_id,
                    timeout = ?request.timeout,
                    "agent timed out",
                );
                self.terminate_group(pgid, &mut child).await;
                let _ = pidfile::remove(&request.pids_root, &request.run_id);
                return Err(AdapterError::Timeout(request.timeout));
            }
        };

        let _ = pidfile::remove(&request.pids_root, &request.run_id);

        let stdout = stdout_task
            .await
            .map_err(|e| AdapterError::Stream(e.to_string()))?
            .map_err(|e| AdapterError::Stream(e.to_string()))?;
        let stderr = stderr_task
            .await
            .map_err(|e| AdapterError::Stream(e.to_string()))?
            .map_err(|e| AdapterError::Stream(e.to_string()))?;

        let exit_code = status.code().unwrap_or(-1);
        if !status.success() {
            return Err(AdapterError::NonZeroExit {
                code: exit_code,
                stderr: tail(&stderr, 2000),
            });
        }

        parse_outcome(self.output, stdout, stderr, exit_code)
    }
}

/// Last `max` bytes of a string on a char boundary.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
