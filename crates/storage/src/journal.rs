// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL journal backing the state store.
//!
//! Line 1 is a header: `{"migrations":[{"name":...,"checksum":...}]}`.
//! Every following line is one mutation record. Appends are fsynced
//! before returning, so durability is per-write rather than batched. A corrupt
//! tail (crash mid-write) is rotated to `.bak` and the valid prefix
//! kept.

use crate::migration::AppliedMigration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use wave_core::{
    ArtifactRecord, CancellationRequest, Event, Run, StepStateRecord,
};

/// Errors that can occur in journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("journal at {} has no header line", .path.display())]
    MissingHeader { path: PathBuf },
}

/// First line of the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub migrations: Vec<AppliedMigration>,
}

/// One durable mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Record {
    #[serde(rename = "run:created")]
    RunCreated { run: Run },

    #[serde(rename = "run:updated")]
    RunUpdated { run: Run },

    #[serde(rename = "step:saved")]
    StepSaved { record: StepStateRecord },

    #[serde(rename = "event:appended")]
    EventAppended { id: u64, event: Event },

    #[serde(rename = "artifact:recorded")]
    ArtifactRecorded { artifact: ArtifactRecord },

    #[serde(rename = "cancellation:requested")]
    CancellationRequested { request: CancellationRequest },
}

/// Append-only journal file handle.
pub struct Journal {
    file: File,
    path: PathBuf,
}

impl Journal {
    /// Create a fresh journal with the given header.
    pub fn create(path: &Path, header: &Header) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        let mut line = serde_json::to_vec(header)?;
        line.push(b'\n');
        file.write_all(&line)?;
        file.sync_all()?;

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    /// Open an existing journal, returning the header and the raw
    /// record values in order.
    ///
    /// A corrupt trailing line is treated as a crash artifact: the
    /// journal is rotated to `.bak` and rewritten with the valid
    /// prefix. A corrupt or missing header is not recoverable.
    pub fn open(path: &Path) -> Result<(Self, Header, Vec<Value>), JournalError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(0))?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(JournalError::MissingHeader {
                path: path.to_owned(),
            });
        }
        let header: Header = serde_json::from_str(line.trim())?;

        let mut records: Vec<Value> = Vec::new();
        let mut corrupt = false;
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    corrupt = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => records.push(value),
                Err(_) => {
                    corrupt = true;
                    break;
                }
            }
        }

        if corrupt {
            let bak = bak_path(path);
            warn!(
                path = %path.display(),
                bak = %bak.display(),
                valid_records = records.len(),
                "corrupt journal tail, rotating to .bak and keeping valid prefix",
            );
            std::fs::rename(path, &bak)?;
            let mut journal = Self::create(path, &header)?;
            for value in &records {
                journal.append_value(value)?;
            }
            return Ok((journal, header, records));
        }

        let file = OpenOptions::new().append(true).open(path)?;
        Ok((
            Self {
                file,
                path: path.to_owned(),
            },
            header,
            records,
        ))
    }

    /// Append one record and fsync. This is the durability point.
    pub fn append(&mut self, record: &Record) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_all()?;
        Ok(())
    }

    fn append_value(&mut self, value: &Value) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Atomically rewrite the whole journal (migration application):
    /// write to `.tmp`, fsync, rename over the old file.
    pub fn rewrite(
        path: &Path,
        header: &Header,
        records: &[Value],
    ) -> Result<Self, JournalError> {
        let tmp_path = path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            let mut line = serde_json::to_vec(header)?;
            line.push(b'\n');
            tmp.write_all(&line)?;
            for value in records {
                let mut line = serde_json::to_vec(value)?;
                line.push(b'\n');
                tmp.write_all(&line)?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Next free `.bak` path (`state.db.bak`, `state.db.bak.1`, ...).
fn bak_path(path: &Path) -> PathBuf {
    let base = PathBuf::from(format!("{}.bak", path.display()));
    if !base.exists() {
        return base;
    }
    for n in 1u32.. {
        let candidate = PathBuf::from(format!("{}.bak.{}", path.display(), n));
        if !candidate.exists() {
            return candidate;
        }
    }
    base
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
