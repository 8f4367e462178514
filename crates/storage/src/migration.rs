// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forward-only, content-addressed schema migrations.
//!
//! Each migration is named and carries a content string; its checksum
//! (SHA-256 of the content) is recorded in the journal header when
//! applied. At open time the recorded set must be a prefix of the
//! registry, name and checksum both matching; any mismatch is fatal.
//! There are no down paths; rebuilding the store is the fallback.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur during migration validation or application
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("store has {applied} applied migrations but this build knows only {known}")]
    TooNew { applied: usize, known: usize },

    #[error("applied migration #{position} is '{found}', expected '{expected}'")]
    NameMismatch {
        position: usize,
        found: String,
        expected: String,
    },

    #[error("checksum mismatch for migration '{name}': stored {stored}, computed {computed}")]
    ChecksumMismatch {
        name: String,
        stored: String,
        computed: String,
    },

    #[error("migration '{name}' failed: {reason}")]
    Failed { name: String, reason: String },
}

/// SHA-256 hex digest of a migration's content.
pub fn checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A migration recorded as applied in the journal header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub name: String,
    pub checksum: String,
}

/// One schema change. `apply` transforms a single journal record.
pub trait Migration: Send + Sync {
    fn name(&self) -> &'static str;
    /// The content string the checksum is computed over. Changing a
    /// shipped migration changes its checksum and bricks existing
    /// stores on purpose.
    fn content(&self) -> &'static str;
    fn apply(&self, record: &mut Value) -> Result<(), MigrationError>;
}

/// The initial schema. Applying it is a no-op; its presence anchors
/// the header so later migrations have a stable base to verify against.
struct InitialSchema;

impl Migration for InitialSchema {
    fn name(&self) -> &'static str {
        "0001-initial"
    }

    fn content(&self) -> &'static str {
        "tables: runs, step_states, events, artifacts, cancellations; \
         journal records tagged by op; per-run monotonic event ids"
    }

    fn apply(&self, _record: &mut Value) -> Result<(), MigrationError> {
        Ok(())
    }
}

/// Ordered registry of all known migrations.
pub struct MigrationRegistry {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    /// Registry with all shipped migrations.
    pub fn new() -> Self {
        Self {
            migrations: vec![Box::new(InitialSchema)],
        }
    }

    /// Append a migration (used by tests to exercise upgrade paths).
    pub fn with(mut self, migration: Box<dyn Migration>) -> Self {
        self.migrations.push(migration);
        self
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// The applied-set a fully migrated store records.
    pub fn applied_set(&self) -> Vec<AppliedMigration> {
        self.migrations
            .iter()
            .map(|m| AppliedMigration {
                name: m.name().to_string(),
                checksum: checksum(m.content()),
            })
            .collect()
    }

    /// Validate a stored applied-set against this registry.
    ///
    /// Returns how many migrations are already applied; the remainder
    /// (`pending`) must be run in order.
    pub fn verify(&self, applied: &[AppliedMigration]) -> Result<usize, MigrationError> {
        if applied.len() > self.migrations.len() {
            return Err(MigrationError::TooNew {
                applied: applied.len(),
                known: self.migrations.len(),
            });
        }
        for (i, stored) in applied.iter().enumerate() {
            let known = &self.migrations[i];
            if stored.name != known.name() {
                return Err(MigrationError::NameMismatch {
                    position: i,
                    found: stored.name.clone(),
                    expected: known.name().to_string(),
                });
            }
            let computed = checksum(known.content());
            if stored.checksum != computed {
                return Err(MigrationError::ChecksumMismatch {
                    name: stored.name.clone(),
                    stored: stored.checksum.clone(),
                    computed,
                });
            }
        }
        Ok(applied.len())
    }

    /// Migrations not yet applied, given a verified applied count.
    pub fn pending(&self, applied: usize) -> &[Box<dyn Migration>] {
        &self.migrations[applied..]
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
