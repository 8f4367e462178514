// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run and step state machines plus the records the store persists.

use crate::id::{RunId, StepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Status of a pipeline run.
///
/// Terminal statuses are write-once: a run that reaches `Completed`,
/// `Failed`, or `Cancelled` never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Whether a transition to `next` is legal.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match self {
            RunStatus::Pending => matches!(
                next,
                RunStatus::Running
                    | RunStatus::Failed
                    | RunStatus::Cancelled
            ),
            RunStatus::Running => next.is_terminal() || next == RunStatus::Running,
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One execution of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub pipeline: String,
    pub input: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StepId>,
    #[serde(default)]
    pub total_tokens: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Run {
    pub fn new(id: RunId, pipeline: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id,
            pipeline: pipeline.into(),
            input: input.into(),
            status: RunStatus::Pending,
            current_step: None,
            total_tokens: 0,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}

/// Per-step execution state.
///
/// Transition relation: pending → running → (completed | retrying |
/// failed); retrying → running. Completed and failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Completed | StepState::Failed)
    }

    pub fn can_transition_to(&self, next: StepState) -> bool {
        match self {
            StepState::Pending => matches!(next, StepState::Running | StepState::Failed),
            StepState::Running => matches!(
                next,
                StepState::Completed | StepState::Retrying | StepState::Failed
            ),
            StepState::Retrying => matches!(next, StepState::Running | StepState::Failed),
            StepState::Completed | StepState::Failed => false,
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Completed => "completed",
            StepState::Failed => "failed",
            StepState::Retrying => "retrying",
        };
        write!(f, "{}", s)
    }
}

/// Stored state of one step within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStateRecord {
    pub run_id: RunId,
    pub step_id: StepId,
    pub state: StepState,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A named file produced by a completed step.
///
/// Written once when the step completes; never mutated thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub run_id: RunId,
    pub step_id: StepId,
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub content_type: String,
    #[serde(default = "default_true")]
    pub exists: bool,
}

fn default_true() -> bool {
    true
}

/// Operator request to stop a run. Idempotent; repeat requests
/// coalesce and a later `force = true` overrides an earlier `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationRequest {
    pub run_id: RunId,
    pub requested_at: DateTime<Utc>,
    pub force: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
