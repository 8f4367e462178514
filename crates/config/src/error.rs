// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration validation errors

use thiserror::Error;
use std::path::PathBuf;

/// Errors surfaced at load time; the engine refuses to run on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pipeline '{0}' has no steps")]
    EmptyPipeline(String),

    #[error("duplicate step id '{0}'")]
    DuplicateStep(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    #[error("dependency cycle involving steps: {0}")]
    DependencyCycle(String),

    #[error("step '{step}' references unknown persona '{persona}'")]
    UnknownPersona { step: String, persona: String },

    #[error("persona '{persona}' references unknown adapter '{adapter}'")]
    UnknownAdapter { persona: String, adapter: String },

    #[error("persona '{persona}' prompt file not found: {}", .path.display())]
    MissingPromptFile { persona: String, path: PathBuf },

    #[error("persona '{0}' declares neither a prompt file nor an inline system prompt")]
    MissingPrompt(String),

    #[error(
        "step '{step}' injects '{artifact}' from '{from_step}', which is not among its dependencies"
    )]
    InjectionNotDependency {
        step: String,
        from_step: String,
        artifact: String,
    },

    #[error("step '{step}' injects undeclared artifact '{artifact}' from step '{from_step}'")]
    UnknownInjectionArtifact {
        step: String,
        from_step: String,
        artifact: String,
    },

    #[error(
        "pipeline uses summarize_to_checkpoint but the manifest declares no 'summarizer' persona"
    )]
    MissingSummarizer,

    #[error("max_concurrent_workers must be at least 1")]
    InvalidConcurrency,

    #[error("relay token_threshold_percent must be between 1 and 100, got {0}")]
    InvalidThreshold(u8),
}
