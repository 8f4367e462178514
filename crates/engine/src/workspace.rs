// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step workspace provisioning and reclamation.
//!
//! Each step gets `{ws_root}/{run_id}/{step_id}/`. Mounts copy sources
//! into the workspace: a copy can never alias another step's writable
//! view of the same inode, and read-only mounts get their write bits
//! dropped (best-effort; correctness rests on the adapter honoring
//! tool-permission policy). Removal restores write permission first so
//! read-only subtrees don't wedge cleanup.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use wave_config::MountMode;
use wave_core::{RunId, StepId};

/// Errors from workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("mount source not found: {}", .0.display())]
    SourceMissing(PathBuf),
    #[error("mount target escapes the workspace: {}", .0.display())]
    TargetEscapes(PathBuf),
}

/// A provisioned step workspace.
#[derive(Debug, Clone)]
pub struct StepWorkspace {
    pub run_id: RunId,
    pub step_id: StepId,
    pub path: PathBuf,
}

/// Allocates and reclaims per-step working directories under a root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, run_id: &RunId, step_id: &StepId) -> PathBuf {
        self.root.join(run_id.as_str()).join(step_id.as_str())
    }

    /// Create the step directory (and parents) on demand.
    pub fn provision(
        &self,
        run_id: &RunId,
        step_id: &StepId,
    ) -> Result<StepWorkspace, WorkspaceError> {
        let path = self.path_for(run_id, step_id);
        fs::create_dir_all(&path)?;
        Ok(StepWorkspace {
            run_id: run_id.clone(),
            step_id: step_id.clone(),
            path,
        })
    }

    /// Copy `source` to `target` (relative to the workspace) honoring
    /// the mount mode. Returns the absolute target path.
    pub fn mount(
        &self,
        workspace: &StepWorkspace,
        source: &Path,
        target: &Path,
        mode: MountMode,
    ) -> Result<PathBuf, WorkspaceError> {
        if target.is_absolute()
            || target
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(WorkspaceError::TargetEscapes(target.to_path_buf()));
        }
        if !source.exists() {
            return Err(WorkspaceError::SourceMissing(source.to_path_buf()));
        }

        let dest = workspace.path.join(target);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if source.is_dir() {
            copy_dir(source, &dest)?;
        } else {
            fs::copy(source, &dest)?;
        }

        if mode == MountMode::Ro {
            set_readonly(&dest)?;
        }
        Ok(dest)
    }

    /// Sorted listing of run directories that currently exist.
    pub fn list_runs(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let mut entries = Vec::new();
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        for entry in dir {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                entries.push(entry.path());
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Remove a run's workspaces. Idempotent; elevates permissions on
    /// read-only subtrees before unlinking.
    pub fn remove_run(&self, run_id: &RunId) -> Result<(), WorkspaceError> {
        let path = self.root.join(run_id.as_str());
        if !path.exists() {
            return Ok(());
        }
        restore_write_permission(&path)?;
        fs::remove_dir_all(&path)?;
        Ok(())
    }
}

fn copy_dir(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Drop write bits on a file, or on every file under a directory.
fn set_readonly(path: &Path) -> io::Result<()> {
    let metadata = fs::metadata(path)?;
    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            set_readonly(&entry?.path())?;
        }
    } else {
        let mut perms = metadata.permissions();
        perms.set_readonly(true);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// Re-grant write permission recursively so removal can proceed.
fn restore_write_permission(path: &Path) -> io::Result<()> {
    let metadata = fs::metadata(path)?;
    let mut perms = metadata.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)?;
    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            restore_write_permission(&entry?.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
