// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mock agent adapter for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{AdapterError, AgentAdapter, InvocationOutcome, InvocationRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Failure a scripted response should produce.
#[derive(Debug, Clone)]
pub enum MockFailure {
    Timeout,
    NonZeroExit { code: i32, stderr: String },
    InvocationFailed(String),
    ParseError(String),
}

impl MockFailure {
    fn to_error(&self) -> AdapterError {
        match self {
            MockFailure::Timeout => AdapterError::Timeout(Duration::from_secs(0)),
            MockFailure::NonZeroExit { code, stderr } => AdapterError::NonZeroExit {
                code: *code,
                stderr: stderr.clone(),
            },
            MockFailure::InvocationFailed(msg) => AdapterError::InvocationFailed(msg.clone()),
            MockFailure::ParseError(msg) => AdapterError::ParseError(msg.clone()),
        }
    }
}

/// One scripted invocation result.
#[derive(Debug, Clone)]
pub struct MockResponse {
    stdout: String,
    tokens: u64,
    delay: Option<Duration>,
    /// Files written into the workdir before returning (declared
    /// outputs the "agent" produced).
    files: Vec<(PathBuf, String)>,
    failure: Option<MockFailure>,
    /// Block until the invocation is cancelled, then return Cancelled.
    hang_until_cancelled: bool,
}

impl MockResponse {
    /// A successful invocation reporting `{"ok":true}`.
    pub fn ok() -> Self {
        Self::with_output(r#"{"ok":true}"#)
    }

    pub fn with_output(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            tokens: 10,
            delay: None,
            files: Vec::new(),
            failure: None,
            hang_until_cancelled: false,
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Write a file (relative to the workdir) before returning.
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }

    pub fn failing(failure: MockFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::with_output("")
        }
    }

    /// Never return until cancelled (for force-cancel tests).
    pub fn hanging() -> Self {
        Self {
            hang_until_cancelled: true,
            ..Self::with_output("")
        }
    }
}

/// Mock agent adapter.
///
/// Responses are scripted per step id and consumed in order; a step
/// with no remaining script gets `MockResponse::ok()`. Every request
/// is recorded for assertion.
#[derive(Clone, Default)]
pub struct MockAgentAdapter {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, VecDeque<MockResponse>>,
    calls: Vec<InvocationRequest>,
}

impl MockAgentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a step.
    pub fn push(&self, step_id: &str, response: MockResponse) {
        self.inner
            .lock()
            .scripts
            .entry(step_id.to_string())
            .or_default()
            .push_back(response);
    }

    /// Replace a step's script wholesale.
    pub fn script(&self, step_id: &str, responses: Vec<MockResponse>) {
        self.inner
            .lock()
            .scripts
            .insert(step_id.to_string(), responses.into());
    }

    /// All recorded requests in invocation order.
    pub fn calls(&self) -> Vec<InvocationRequest> {
        self.inner.lock().calls.clone()
    }

    /// How many times a step was invoked.
    pub fn invocations(&self, step_id: &str) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| c.step_id == *step_id)
            .count()
    }

    /// Requests made under a given persona.
    pub fn calls_for_persona(&self, persona: &str) -> Vec<InvocationRequest> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| c.persona == persona)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AgentAdapter for MockAgentAdapter {
    async fn invoke(
        &self,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> Result<InvocationOutcome, AdapterError> {
        let response = {
            let mut inner = self.inner.lock();
            inner.calls.push(request.clone());
            inner
                .scripts
                .get_mut(request.step_id.as_str())
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(MockResponse::ok)
        };

        if response.hang_until_cancelled {
            cancel.cancelled().await;
            return Err(AdapterError::Cancelled);
        }

        if let Some(delay) = response.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
            }
        }

        if let Some(failure) = &response.failure {
            return Err(failure.to_error());
        }

        for (path, content) in &response.files {
            let full = request.workdir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AdapterError::InvocationFailed(e.to_string()))?;
            }
            std::fs::write(&full, content)
                .map_err(|e| AdapterError::InvocationFailed(e.to_string()))?;
        }

        Ok(InvocationOutcome {
            result: serde_json::from_str(&response.stdout).ok(),
            stdout: response.stdout,
            stderr: String::new(),
            exit_code: 0,
            tokens_used: response.tokens,
            tokens_estimated: false,
        })
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
