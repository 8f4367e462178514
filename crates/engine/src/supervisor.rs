// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process lifecycle: run-id minting, signal handling, forcible kill.

use crate::cancel::RunCancellation;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use wave_adapters::pidfile;
use wave_core::RunId;

/// Grace window between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Mint a run id: `{pipeline}-{YYYYMMDD}-{HHMMSS}-{xxxx}`.
///
/// The pipeline name is sanitized to the id charset and the random
/// suffix keeps same-second mints collision-resistant.
pub fn mint_run_id(pipeline: &str, now: DateTime<Utc>) -> RunId {
    let name = sanitize_pipeline_name(pipeline);
    let stamp = now.format("%Y%m%d-%H%M%S");
    RunId::new(format!("{}-{}-{}", name, stamp, short_suffix(4)))
}

/// Keep `[A-Za-z0-9._-]`, collapse everything else to single hyphens,
/// and trim leading dots so the result passes run-id validation.
fn sanitize_pipeline_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' => c,
            _ => '-',
        })
        .collect();
    let collapsed = mapped
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let trimmed = collapsed.trim_start_matches('.').to_string();
    if trimmed.is_empty() {
        "pipeline".to_string()
    } else {
        trimmed
    }
}

/// Short lowercase alphanumeric suffix.
fn short_suffix(len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Owns pidfile-based process-group termination and top-level signals.
#[derive(Debug, Clone)]
pub struct Supervisor {
    pids_root: PathBuf,
    grace: Duration,
}

impl Supervisor {
    pub fn new(pids_root: impl Into<PathBuf>) -> Self {
        Self {
            pids_root: pids_root.into(),
            grace: KILL_GRACE,
        }
    }

    /// Override the SIGTERM grace window (tests shorten it).
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Kill the recorded process group for a run: SIGTERM, wait up to
    /// the grace window, then SIGKILL. Returns false when no pidfile
    /// exists (nothing to kill). Run ids are validated before any
    /// filesystem access.
    pub async fn force_kill(&self, run_id: &RunId) -> Result<bool, EngineError> {
        RunId::validate(run_id.as_str())
            .map_err(|e| EngineError::Usage(format!("invalid run id: {}", e)))?;

        let Some(pid) = pidfile::read(&self.pids_root, run_id)
            .map_err(|e| EngineError::Internal(format!("pidfile read: {}", e)))?
        else {
            return Ok(false);
        };
        let pgid = Pid::from_raw(pid as i32);

        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            // Already gone: stale pidfile from an earlier crash
            tracing::info!(run_id = %run_id, pid, error = %e, "process group already gone");
            let _ = pidfile::remove(&self.pids_root, run_id);
            return Ok(false);
        }

        let deadline = tokio::time::Instant::now() + self.grace;
        while tokio::time::Instant::now() < deadline {
            if kill(pgid, None).is_err() {
                let _ = pidfile::remove(&self.pids_root, run_id);
                return Ok(true);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tracing::warn!(run_id = %run_id, pid, "grace window elapsed, sending SIGKILL");
        let _ = killpg(pgid, Signal::SIGKILL);
        let _ = pidfile::remove(&self.pids_root, run_id);
        Ok(true)
    }

    /// Install SIGINT/SIGTERM handling for the active run: the first
    /// signal requests graceful cancellation, a second escalates to
    /// force.
    pub fn install_signal_handler(
        cancel: RunCancellation,
    ) -> Result<tokio::task::JoinHandle<()>, EngineError> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| EngineError::Internal(format!("signal handler: {}", e)))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| EngineError::Internal(format!("signal handler: {}", e)))?;

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
                if cancel.is_graceful_requested() {
                    tracing::warn!("second signal, escalating to force cancellation");
                    cancel.cancel_force();
                    return;
                }
                tracing::info!("signal received, requesting graceful cancellation");
                cancel.cancel_graceful();
            }
        }))
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
