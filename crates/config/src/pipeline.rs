// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline definitions: ordered steps, dependencies, contracts.
//!
//! Step order in the definition is semantic: when several steps become
//! ready at the same instant, the scheduler launches them in declaration
//! order. Tests depend on this determinism.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// A pipeline: a DAG of agent steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "step")]
    pub steps: Vec<StepDef>,
}

impl PipelineDef {
    pub fn get_step(&self, id: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// One node of the pipeline DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDef {
    pub id: String,
    pub persona: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub prompt: PromptSource,
    #[serde(default)]
    pub memory: MemoryStrategy,
    /// Upstream artifacts copied into this step's workspace.
    #[serde(default)]
    pub inject: Vec<InjectionDef>,
    /// Extra filesystem mounts (project files, skill data).
    #[serde(default)]
    pub mounts: Vec<MountDef>,
    /// Artifacts this step must produce.
    #[serde(default)]
    pub outputs: Vec<OutputDef>,
    #[serde(default)]
    pub contract: ContractDef,
}

/// Where a step's prompt text comes from.
///
/// Accepts either:
///   `prompt = "text"`              — inline
///   `prompt = { file = "plan.md" }` — file under `.wave/pipelines/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptSource {
    Inline(String),
    File { file: PathBuf },
}

/// How a step's context relates to upstream steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStrategy {
    /// Independent of upstream messages.
    #[default]
    Fresh,
    /// Upstream artifact texts are appended to the prompt.
    Incremental,
    /// Like incremental, but collapses to a summarized checkpoint once
    /// the token budget threshold is crossed.
    SummarizeToCheckpoint,
}

/// An upstream artifact materialized into this step's workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InjectionDef {
    pub from_step: String,
    pub artifact: String,
    /// Local filename inside the workspace; defaults to the artifact name.
    #[serde(default, rename = "as")]
    pub as_file: Option<String>,
}

impl InjectionDef {
    pub fn local_name(&self) -> &str {
        self.as_file.as_deref().unwrap_or(&self.artifact)
    }
}

/// Mount mode for workspace sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    #[default]
    Ro,
    Rw,
}

/// A source path exposed inside the step workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountDef {
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(default)]
    pub mode: MountMode,
}

/// An artifact the step declares it will write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDef {
    pub name: String,
    /// Path inside the step workspace.
    pub path: PathBuf,
    #[serde(default = "default_content_type", rename = "type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

/// What to do when contract validation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    Retry,
    #[default]
    Fail,
}

/// Validation applied to a step's declared outputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractDef {
    #[serde(default)]
    pub schema: SchemaKind,
    #[serde(default)]
    pub on_failure: OnFailure,
    #[serde(default)]
    pub max_retries: u32,
}

/// Output schema kinds.
///
/// Accepts either a bare name or an inline schema block:
///   `schema = "exists" | "non_empty" | "json"`
///   `schema = { schema = { type = "object", required = ["ok"] } }`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    /// The declared file exists.
    #[default]
    Exists,
    /// The declared file exists and is not empty.
    NonEmpty,
    /// The declared file parses as JSON.
    Json,
    /// The declared file parses as JSON and matches a schema subset
    /// (`type`, `required`, `properties`, `items`, `enum`).
    Schema { schema: Value },
}

impl<'de> Deserialize<'de> for SchemaKind {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Inline { schema: Value },
        }
        match Raw::deserialize(d)? {
            Raw::Name(name) => match name.as_str() {
                "exists" => Ok(SchemaKind::Exists),
                "non_empty" => Ok(SchemaKind::NonEmpty),
                "json" => Ok(SchemaKind::Json),
                other => Err(serde::de::Error::unknown_variant(
                    other,
                    &["exists", "non_empty", "json"],
                )),
            },
            Raw::Inline { schema } => Ok(SchemaKind::Schema { schema }),
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
