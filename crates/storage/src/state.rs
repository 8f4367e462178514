// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory tables materialized from journal replay.
//!
//! # Idempotency Requirement
//!
//! **All record handlers MUST be idempotent.** Replaying the same
//! record twice must produce the same tables as applying it once: a
//! crash between journal append and process exit means the next open
//! replays everything. Use assignment over mutation and guard inserts
//! with existence checks.

use crate::journal::Record;
use indexmap::IndexMap;
use std::collections::HashMap;
use wave_core::{ArtifactRecord, CancellationRequest, Event, Run, StepStateRecord};

/// An event with its per-run monotonic id.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: u64,
    pub event: Event,
}

/// Materialized state built from journal replay.
#[derive(Debug, Default, Clone)]
pub struct Tables {
    pub runs: HashMap<String, Run>,
    /// run id → step id → state, in first-write order.
    pub step_states: HashMap<String, IndexMap<String, StepStateRecord>>,
    /// run id → events in ascending id order.
    pub events: HashMap<String, Vec<EventRecord>>,
    /// run id → artifacts in record order.
    pub artifacts: HashMap<String, Vec<ArtifactRecord>>,
    pub cancellations: HashMap<String, CancellationRequest>,
}

impl Tables {
    /// Apply one journal record.
    pub fn apply(&mut self, record: &Record) {
        match record {
            Record::RunCreated { run } => {
                // Idempotency: first creation wins
                self.runs
                    .entry(run.id.as_str().to_string())
                    .or_insert_with(|| run.clone());
            }

            Record::RunUpdated { run } => {
                self.runs.insert(run.id.as_str().to_string(), run.clone());
            }

            Record::StepSaved { record } => {
                self.step_states
                    .entry(record.run_id.as_str().to_string())
                    .or_default()
                    .insert(record.step_id.as_str().to_string(), record.clone());
            }

            Record::EventAppended { id, event } => {
                let events = self
                    .events
                    .entry(event.run_id.as_str().to_string())
                    .or_default();
                // Idempotency: skip ids already present
                if events.last().map(|e| e.id < *id).unwrap_or(true) {
                    events.push(EventRecord {
                        id: *id,
                        event: event.clone(),
                    });
                }
            }

            Record::ArtifactRecorded { artifact } => {
                let artifacts = self
                    .artifacts
                    .entry(artifact.run_id.as_str().to_string())
                    .or_default();
                // Write-once: first record for (step, name) wins
                let exists = artifacts.iter().any(|a| {
                    a.step_id == artifact.step_id && a.name == artifact.name
                });
                if !exists {
                    artifacts.push(artifact.clone());
                }
            }

            Record::CancellationRequested { request } => {
                let key = request.run_id.as_str().to_string();
                match self.cancellations.get_mut(&key) {
                    Some(existing) => {
                        // Coalesce: force sticks once set, first timestamp kept
                        existing.force = existing.force || request.force;
                        if existing.reason.is_none() {
                            existing.reason.clone_from(&request.reason);
                        }
                    }
                    None => {
                        self.cancellations.insert(key, request.clone());
                    }
                }
            }
        }
    }

    /// Next event id for a run (ids start at 1).
    pub fn next_event_id(&self, run_id: &str) -> u64 {
        self.events
            .get(run_id)
            .and_then(|events| events.last())
            .map(|e| e.id + 1)
            .unwrap_or(1)
    }

    pub fn get_artifact(
        &self,
        run_id: &str,
        step_id: &str,
        name: &str,
    ) -> Option<&ArtifactRecord> {
        self.artifacts
            .get(run_id)?
            .iter()
            .find(|a| a.step_id == *step_id && a.name == name)
    }

    pub fn get_step_state(&self, run_id: &str, step_id: &str) -> Option<&StepStateRecord> {
        self.step_states.get(run_id)?.get(step_id)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
