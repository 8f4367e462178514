// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic pidfiles for agent process groups.
//!
//! The file at `{pids_root}/{run_id}.pid` holds the process-group
//! leader's PID as decimal text. Writes go through a temp file and
//! rename so a crash never leaves a torn pidfile. Run ids are
//! validated before touching the filesystem; traversal sequences and
//! separators never reach a path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use wave_core::RunId;

/// Path of the pidfile for a run.
pub fn path_for(pids_root: &Path, run_id: &RunId) -> io::Result<PathBuf> {
    RunId::validate(run_id.as_str())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    Ok(pids_root.join(format!("{}.pid", run_id)))
}

/// Write the pidfile atomically (write-temp-then-rename).
pub fn write(pids_root: &Path, run_id: &RunId, pid: u32) -> io::Result<PathBuf> {
    let path = path_for(pids_root, run_id)?;
    fs::create_dir_all(pids_root)?;

    let tmp = path.with_extension("pid.tmp");
    fs::write(&tmp, format!("{}\n", pid))?;
    fs::rename(&tmp, &path)?;
    Ok(path)
}

/// Read the recorded PID, if a pidfile exists.
pub fn read(pids_root: &Path, run_id: &RunId) -> io::Result<Option<u32>> {
    let path = path_for(pids_root, run_id)?;
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    content
        .trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Remove the pidfile. Idempotent.
pub fn remove(pids_root: &Path, run_id: &RunId) -> io::Result<()> {
    let path = path_for(pids_root, run_id)?;
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "pidfile_tests.rs"]
mod tests;
