// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record builders shared by storage and engine tests.
#![cfg_attr(coverage_nightly, coverage(off))]
#![allow(clippy::unwrap_used)]

use crate::event::{Event, EventKind};
use crate::id::{RunId, StepId};
use crate::run::{ArtifactRecord, Run, StepState, StepStateRecord};
use chrono::Utc;
use std::path::Path;

/// Build a pending run with the given id.
pub fn run(id: &str) -> Run {
    Run::new(RunId::new(id), "demo", "hello")
}

/// Build a pending run for a named pipeline.
pub fn run_for(id: &str, pipeline: &str) -> Run {
    Run::new(RunId::new(id), pipeline, "hello")
}

/// Build a step state record.
pub fn step_state(run_id: &str, step_id: &str, state: StepState) -> StepStateRecord {
    StepStateRecord {
        run_id: RunId::new(run_id),
        step_id: StepId::new(step_id),
        state,
        retry_count: 0,
        last_error: None,
        updated_at: Utc::now(),
    }
}

/// Build an artifact record rooted at `path`.
pub fn artifact(run_id: &str, step_id: &str, name: &str, path: &Path) -> ArtifactRecord {
    ArtifactRecord {
        run_id: RunId::new(run_id),
        step_id: StepId::new(step_id),
        name: name.to_string(),
        path: path.to_path_buf(),
        size_bytes: 0,
        content_type: "text/plain".to_string(),
        exists: true,
    }
}

/// Build a `step:started` event.
pub fn step_started_event(run_id: &str, step_id: &str) -> Event {
    Event::step(
        RunId::new(run_id),
        StepId::new(step_id),
        EventKind::StepStarted {
            persona: "builder".to_string(),
            attempt: 0,
        },
    )
}

/// Build a `run:started` event.
pub fn run_started_event(run_id: &str) -> Event {
    Event::run(
        RunId::new(run_id),
        EventKind::RunStarted {
            pipeline: "demo".to_string(),
            input: "hello".to_string(),
        },
    )
}
