// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy and exit codes.

use thiserror::Error;
use wave_adapters::AdapterError;
use wave_config::ConfigError;
use wave_core::StepId;
use wave_storage::StoreError;

/// Errors the engine surfaces to its caller. Step-scoped variants
/// carry the step id they failed in.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("preflight failed: missing tools {missing_tools:?}, missing skills {missing_skills:?}")]
    Preflight {
        missing_tools: Vec<String>,
        missing_skills: Vec<String>,
        recovery_hints: Vec<String>,
    },

    #[error("adapter error in step '{step_id}': {source}")]
    Adapter {
        step_id: StepId,
        #[source]
        source: AdapterError,
    },

    #[error("contract failed for step '{step_id}': {reason}")]
    Contract { step_id: StepId, reason: String },

    #[error("run cancelled (force={force})")]
    Cancelled { force: bool },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("workspace error in step '{step_id}': {message}")]
    Workspace { step_id: StepId, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Caller-observable exit code. Zero is success and never produced
    /// by an error.
    pub fn exit_code(&self) -> u8 {
        match self {
            EngineError::Usage(_) => 2,
            EngineError::Config(_) => 3,
            EngineError::Preflight { .. } => 4,
            EngineError::Adapter { .. } => 5,
            EngineError::Contract { .. } => 6,
            EngineError::Cancelled { .. } => 7,
            EngineError::Store(_) => 8,
            EngineError::Workspace { .. } | EngineError::Internal(_) => 70,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
