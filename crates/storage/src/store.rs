// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-writer, multi-reader state store.
//!
//! All mutations append to the journal first (durability), then apply
//! to the tables under the write lock (visibility). A reader observing
//! a run status therefore also observes every record written before
//! it. `in_memory()` skips the journal entirely; the engine can run
//! without persistence, at the cost of making resume impossible.

use crate::journal::{Header, Journal, JournalError, Record};
use crate::migration::{MigrationError, MigrationRegistry};
use crate::state::{EventRecord, Tables};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use thiserror::Error;
use tracing::info;
use wave_core::{
    ArtifactRecord, CancellationRequest, Event, Run, RunId, RunStatus, StepId, StepState,
    StepStateRecord,
};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("run already exists: {0}")]
    RunExists(RunId),
    #[error("run not found: {0}")]
    RunNotFound(RunId),
    #[error("run {id} is {status}; terminal statuses are immutable")]
    TerminalRun { id: RunId, status: RunStatus },
    #[error("illegal status transition for run {id}: {from} -> {to}")]
    InvalidTransition {
        id: RunId,
        from: RunStatus,
        to: RunStatus,
    },
    #[error("artifact already recorded for run {run_id} step {step_id}: {name}")]
    ArtifactExists {
        run_id: RunId,
        step_id: StepId,
        name: String,
    },
}

/// Durable store of runs, step states, events, artifacts, and
/// cancellation requests.
pub struct StateStore {
    tables: RwLock<Tables>,
    journal: Option<Mutex<Journal>>,
}

impl StateStore {
    /// Open (or create) the store at `path`, applying pending
    /// migrations. A header whose applied set does not match the
    /// registry is fatal.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_registry(path, MigrationRegistry::new())
    }

    /// Open with a caller-provided registry (tests exercise upgrade
    /// and mismatch paths through this).
    pub fn open_with_registry(
        path: &Path,
        registry: MigrationRegistry,
    ) -> Result<Self, StoreError> {
        let (journal, records) = if path.exists() {
            let (journal, header, mut values) = Journal::open(path)?;
            let applied = registry.verify(&header.migrations)?;
            let pending = registry.pending(applied);

            let journal = if pending.is_empty() {
                journal
            } else {
                info!(
                    path = %path.display(),
                    count = pending.len(),
                    "applying pending store migrations",
                );
                for migration in pending {
                    for value in values.iter_mut() {
                        migration.apply(value)?;
                    }
                }
                drop(journal);
                let header = Header {
                    migrations: registry.applied_set(),
                };
                Journal::rewrite(path, &header, &values)?
            };

            let mut records = Vec::with_capacity(values.len());
            for value in values {
                records.push(serde_json::from_value::<Record>(value)?);
            }
            (journal, records)
        } else {
            let header = Header {
                migrations: registry.applied_set(),
            };
            (Journal::create(path, &header)?, Vec::new())
        };

        let mut tables = Tables::default();
        for record in &records {
            tables.apply(record);
        }

        Ok(Self {
            tables: RwLock::new(tables),
            journal: Some(Mutex::new(journal)),
        })
    }

    /// A store with no journal. Resume across processes is impossible.
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            journal: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.journal.is_some()
    }

    /// Durability point: journal append happens before the record
    /// becomes visible in the tables.
    fn commit(&self, tables: &mut Tables, record: Record) -> Result<(), StoreError> {
        if let Some(journal) = &self.journal {
            journal.lock().append(&record)?;
        }
        tables.apply(&record);
        Ok(())
    }

    // -- writes --

    /// Insert a new run in status `pending`. The id must be fresh.
    pub fn create_run(&self, run: Run) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.runs.contains_key(run.id.as_str()) {
            return Err(StoreError::RunExists(run.id));
        }
        self.commit(&mut tables, Record::RunCreated { run })
    }

    /// CAS-style status update; rejects transitions out of terminal
    /// states. Sets `completed_at` exactly when the new status is
    /// terminal.
    pub fn update_run_status(
        &self,
        id: &RunId,
        status: RunStatus,
        current_step: Option<StepId>,
        total_tokens: u64,
        error: Option<String>,
    ) -> Result<Run, StoreError> {
        let mut tables = self.tables.write();
        let Some(existing) = tables.runs.get(id.as_str()) else {
            return Err(StoreError::RunNotFound(id.clone()));
        };
        if existing.status.is_terminal() {
            return Err(StoreError::TerminalRun {
                id: id.clone(),
                status: existing.status,
            });
        }
        if !existing.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                from: existing.status,
                to: status,
            });
        }

        let mut run = existing.clone();
        run.status = status;
        run.current_step = current_step;
        run.total_tokens = total_tokens;
        run.error = error;
        run.completed_at = status.is_terminal().then(Utc::now);

        self.commit(&mut tables, Record::RunUpdated { run: run.clone() })?;
        Ok(run)
    }

    /// Reopen a failed or cancelled run for resumption. Completed runs
    /// stay closed; this is the only sanctioned exit from a terminal
    /// status, and it exists so `resume` can continue interrupted work.
    pub fn reopen_run(&self, id: &RunId) -> Result<Run, StoreError> {
        let mut tables = self.tables.write();
        let Some(existing) = tables.runs.get(id.as_str()) else {
            return Err(StoreError::RunNotFound(id.clone()));
        };
        if existing.status == RunStatus::Completed {
            return Err(StoreError::TerminalRun {
                id: id.clone(),
                status: existing.status,
            });
        }

        let mut run = existing.clone();
        run.status = RunStatus::Running;
        run.completed_at = None;
        run.error = None;

        self.commit(&mut tables, Record::RunUpdated { run: run.clone() })?;
        Ok(run)
    }

    /// Upsert a step state. Transitioning running → retrying
    /// increments the retry count.
    pub fn save_step_state(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        state: StepState,
        error: Option<&str>,
    ) -> Result<StepStateRecord, StoreError> {
        let mut tables = self.tables.write();
        if !tables.runs.contains_key(run_id.as_str()) {
            return Err(StoreError::RunNotFound(run_id.clone()));
        }

        let previous = tables.get_step_state(run_id.as_str(), step_id.as_str());
        let mut retry_count = previous.map(|p| p.retry_count).unwrap_or(0);
        if let Some(prev) = previous {
            if prev.state == StepState::Running && state == StepState::Retrying {
                retry_count += 1;
            }
        }
        // Pending is the initial state; re-entering it (resume) resets
        // the retry budget.
        if state == StepState::Pending {
            retry_count = 0;
        }

        let record = StepStateRecord {
            run_id: run_id.clone(),
            step_id: step_id.clone(),
            state,
            retry_count,
            last_error: error.map(str::to_string),
            updated_at: Utc::now(),
        };
        self.commit(
            &mut tables,
            Record::StepSaved {
                record: record.clone(),
            },
        )?;
        Ok(record)
    }

    /// Append an event, assigning the next per-run monotonic id.
    pub fn append_event(&self, event: Event) -> Result<u64, StoreError> {
        let mut tables = self.tables.write();
        if !tables.runs.contains_key(event.run_id.as_str()) {
            return Err(StoreError::RunNotFound(event.run_id.clone()));
        }
        let id = tables.next_event_id(event.run_id.as_str());
        self.commit(&mut tables, Record::EventAppended { id, event })?;
        Ok(id)
    }

    /// Record an artifact. Write-once: a duplicate (run, step, name)
    /// is an error and the stored path is unchanged.
    pub fn record_artifact(&self, artifact: ArtifactRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if !tables.runs.contains_key(artifact.run_id.as_str()) {
            return Err(StoreError::RunNotFound(artifact.run_id.clone()));
        }
        if tables
            .get_artifact(
                artifact.run_id.as_str(),
                artifact.step_id.as_str(),
                &artifact.name,
            )
            .is_some()
        {
            return Err(StoreError::ArtifactExists {
                run_id: artifact.run_id,
                step_id: artifact.step_id,
                name: artifact.name,
            });
        }
        self.commit(&mut tables, Record::ArtifactRecorded { artifact })
    }

    /// Upsert a cancellation request. Idempotent; a later
    /// `force = true` overrides an earlier `false`.
    pub fn request_cancellation(
        &self,
        run_id: &RunId,
        force: bool,
        reason: Option<String>,
    ) -> Result<CancellationRequest, StoreError> {
        let mut tables = self.tables.write();
        if !tables.runs.contains_key(run_id.as_str()) {
            return Err(StoreError::RunNotFound(run_id.clone()));
        }
        let request = CancellationRequest {
            run_id: run_id.clone(),
            requested_at: Utc::now(),
            force,
            reason,
        };
        self.commit(
            &mut tables,
            Record::CancellationRequested { request },
        )?;
        // Read back the coalesced form
        Ok(tables
            .cancellations
            .get(run_id.as_str())
            .cloned()
            .unwrap_or_else(|| CancellationRequest {
                run_id: run_id.clone(),
                requested_at: Utc::now(),
                force,
                reason: None,
            }))
    }

    // -- reads --

    pub fn check_cancellation(&self, run_id: &RunId) -> Option<CancellationRequest> {
        self.tables
            .read()
            .cancellations
            .get(run_id.as_str())
            .cloned()
    }

    pub fn get_run(&self, run_id: &RunId) -> Option<Run> {
        self.tables.read().runs.get(run_id.as_str()).cloned()
    }

    /// All runs, newest first.
    pub fn list_runs(&self) -> Vec<Run> {
        let tables = self.tables.read();
        let mut runs: Vec<Run> = tables.runs.values().cloned().collect();
        runs.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        runs
    }

    pub fn get_step_states(&self, run_id: &RunId) -> Vec<StepStateRecord> {
        self.tables
            .read()
            .step_states
            .get(run_id.as_str())
            .map(|steps| steps.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_artifacts(&self, run_id: &RunId) -> Vec<ArtifactRecord> {
        self.tables
            .read()
            .artifacts
            .get(run_id.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_artifact(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        name: &str,
    ) -> Option<ArtifactRecord> {
        self.tables
            .read()
            .get_artifact(run_id.as_str(), step_id.as_str(), name)
            .cloned()
    }

    /// Events for a run in ascending id order.
    pub fn get_events(&self, run_id: &RunId) -> Vec<EventRecord> {
        self.tables
            .read()
            .events
            .get(run_id.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// Distinct pipeline names by most recent run, capped at `limit`.
    pub fn list_recent_pipelines(&self, limit: usize) -> Vec<String> {
        let mut names = Vec::new();
        for run in self.list_runs() {
            if !names.contains(&run.pipeline) {
                names.push(run.pipeline);
                if names.len() == limit {
                    break;
                }
            }
        }
        names
    }

    pub fn get_running_runs(&self) -> Vec<Run> {
        let tables = self.tables.read();
        let mut runs: Vec<Run> = tables
            .runs
            .values()
            .filter(|r| r.status == RunStatus::Running)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        runs
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
