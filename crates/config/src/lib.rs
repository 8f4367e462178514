// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Typed manifest and pipeline model consumed by the Wave engine.
//!
//! Loaders (YAML files under `.wave/`) are external collaborators; they
//! deserialize into these closed structs. Unknown keys are rejected so
//! configuration drift fails loudly instead of silently.

mod dag;
mod error;
mod manifest;
mod pipeline;
mod validate;

pub use dag::Dag;
pub use error::ConfigError;
pub use manifest::{
    AdapterDef, Manifest, OutputFormat, PersonaDef, RelayDef, RuntimeDef, SkillMount, WavePaths,
    SUMMARIZER_PERSONA,
};
pub use pipeline::{
    ContractDef, InjectionDef, MemoryStrategy, MountDef, MountMode, OnFailure, OutputDef,
    PipelineDef, PromptSource, SchemaKind, StepDef,
};
pub use validate::validate;
