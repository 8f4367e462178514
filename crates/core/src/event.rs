// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event records emitted by the engine.
//!
//! Serializes with a `{"state": "run:started", ...fields}` label so the
//! stream is pipeable as newline-delimited JSON. Consumers must tolerate
//! new fields; all optional fields default on read.

use crate::id::{RunId, StepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A structured engine event.
///
/// `step_id` is absent for pipeline-level events. Persisted events carry
/// a per-run monotonic id assigned by the state store; the in-process
/// form here is id-less.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// State labels and kind-specific payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum EventKind {
    // -- run --
    #[serde(rename = "run:started")]
    RunStarted { pipeline: String, input: String },

    #[serde(rename = "run:completed")]
    RunCompleted { total_tokens: u64, duration_ms: u64 },

    #[serde(rename = "run:failed")]
    RunFailed {
        error: String,
        /// Human-actionable suggestions, rendered uniformly by text and
        /// JSON consumers.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        recovery_hints: Vec<String>,
    },

    #[serde(rename = "run:cancelled")]
    RunCancelled {
        force: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // -- step --
    #[serde(rename = "step:started")]
    StepStarted { persona: String, attempt: u32 },

    #[serde(rename = "step:completed")]
    StepCompleted {
        persona: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },

    #[serde(rename = "step:retrying")]
    StepRetrying {
        attempt: u32,
        max_retries: u32,
        reason: String,
    },

    #[serde(rename = "step:failed")]
    StepFailed {
        error: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        recovery_hints: Vec<String>,
    },

    /// A step made unreachable by an upstream failure or cancellation.
    #[serde(rename = "step:skipped")]
    StepSkipped { reason: String },

    // -- relay --
    #[serde(rename = "relay:checkpoint")]
    RelayCheckpoint {
        artifact: String,
        tokens_before: u64,
        tokens_after: u64,
    },

    // -- usage --
    #[serde(rename = "token:usage")]
    TokenUsage { tokens: u64, cumulative: u64 },
}

impl Event {
    /// Build a pipeline-level event stamped with the current wall clock.
    pub fn run(run_id: RunId, kind: EventKind) -> Self {
        Self {
            run_id,
            step_id: None,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Build a step-level event stamped with the current wall clock.
    pub fn step(run_id: RunId, step_id: StepId, kind: EventKind) -> Self {
        Self {
            run_id,
            step_id: Some(step_id),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// The state label this event serializes under.
    pub fn label(&self) -> &'static str {
        match self.kind {
            EventKind::RunStarted { .. } => "run:started",
            EventKind::RunCompleted { .. } => "run:completed",
            EventKind::RunFailed { .. } => "run:failed",
            EventKind::RunCancelled { .. } => "run:cancelled",
            EventKind::StepStarted { .. } => "step:started",
            EventKind::StepCompleted { .. } => "step:completed",
            EventKind::StepRetrying { .. } => "step:retrying",
            EventKind::StepFailed { .. } => "step:failed",
            EventKind::StepSkipped { .. } => "step:skipped",
            EventKind::RelayCheckpoint { .. } => "relay:checkpoint",
            EventKind::TokenUsage { .. } => "token:usage",
        }
    }

    /// Tokens reported by this event, if any.
    pub fn tokens(&self) -> Option<u64> {
        match &self.kind {
            EventKind::StepCompleted { tokens, .. } => *tokens,
            EventKind::TokenUsage { tokens, .. } => Some(*tokens),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
