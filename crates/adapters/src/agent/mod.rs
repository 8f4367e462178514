// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent invocation adapters.
//!
//! One capability, two realizations: `ProcessAgentAdapter` spawns the
//! configured binary in its own process group so the supervisor can
//! kill the whole tree; `MockAgentAdapter` returns scripted output for
//! deterministic tests.

mod output;
mod process;

pub use output::{estimate_tokens, parse_outcome};
pub use process::ProcessAgentAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod mock;
#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockAgentAdapter, MockFailure, MockResponse};

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use wave_core::{RunId, StepId};

/// Errors from one agent invocation.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invocation failed: {0}")]
    InvocationFailed(String),
    #[error("agent timed out after {0:?}")]
    Timeout(Duration),
    #[error("agent stream error: {0}")]
    Stream(String),
    #[error("agent exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("invocation cancelled")]
    Cancelled,
    #[error("failed to parse agent output: {0}")]
    ParseError(String),
}

impl AdapterError {
    /// Whether a retry could plausibly succeed. Timeouts and stream
    /// failures (broken pipe, partial read) are transient; a plain
    /// non-zero exit or unparseable output is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Timeout(_) | AdapterError::Stream(_))
    }
}

/// Everything one invocation needs: where to run, what to say, and
/// what the child is allowed to touch.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub run_id: RunId,
    pub step_id: StepId,
    /// Persona name, for logging and events.
    pub persona: String,
    /// Working directory (the step workspace).
    pub workdir: PathBuf,
    pub system_prompt: String,
    pub user_prompt: String,
    pub allowed_tools: Vec<String>,
    pub denied_tools: Vec<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
    /// Directory for the `{run_id}.pid` pidfile.
    pub pids_root: PathBuf,
}

/// What a finished invocation produced.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub tokens_used: u64,
    /// True when the adapter estimated tokens from output length
    /// instead of reading a reported count.
    pub tokens_estimated: bool,
    /// Parsed JSON result for json-format adapters.
    pub result: Option<serde_json::Value>,
}

/// Capability for running one step's prompt against a working
/// directory.
#[async_trait]
pub trait AgentAdapter: Clone + Send + Sync + 'static {
    /// Run the agent to completion.
    ///
    /// Cancelling `cancel` must propagate to the child as SIGTERM,
    /// escalating to SIGKILL after a grace window. Artifacts are
    /// written by the agent inside `request.workdir`.
    async fn invoke(
        &self,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> Result<InvocationOutcome, AdapterError>;
}
