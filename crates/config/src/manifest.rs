// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level manifest: adapters, personas, runtime settings, skill mounts.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persona name the relay invokes for checkpoint summarization.
pub const SUMMARIZER_PERSONA: &str = "summarizer";

/// The fully-parsed top-level manifest (`wave.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, alias = "adapter")]
    pub adapters: IndexMap<String, AdapterDef>,
    #[serde(default, alias = "persona")]
    pub personas: IndexMap<String, PersonaDef>,
    #[serde(default)]
    pub runtime: RuntimeDef,
    #[serde(default, alias = "skill")]
    pub skills: Vec<SkillMount>,
}

impl Manifest {
    pub fn get_adapter(&self, name: &str) -> Option<&AdapterDef> {
        self.adapters.get(name)
    }

    pub fn get_persona(&self, name: &str) -> Option<&PersonaDef> {
        self.personas.get(name)
    }

    /// The summarizer persona, if declared.
    pub fn summarizer(&self) -> Option<&PersonaDef> {
        self.personas.get(SUMMARIZER_PERSONA)
    }
}

/// How an adapter binary reports its result on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Stdout is one JSON object carrying `result` and `usage.total_tokens`.
    #[default]
    Json,
    /// Stdout is freeform; token usage is estimated from output length.
    Text,
}

/// Declaration of an external agent binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterDef {
    /// Binary name or path.
    pub command: String,
    /// Base arguments prepended to every invocation.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub output: OutputFormat,
    /// Default tool permissions applied when a persona does not override.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub denied_tools: Vec<String>,
}

/// A named agent configuration: adapter binding, prompt, model knobs,
/// tool permissions, and preflight requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaDef {
    pub adapter: String,
    /// System prompt file, relative to `.wave/personas/`.
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,
    /// Inline system prompt; takes precedence over `prompt_file`.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub denied_tools: Vec<String>,
    /// Binaries that must resolve on PATH before this persona runs.
    #[serde(default)]
    pub requires_tools: Vec<String>,
    /// Skill mounts (by name) this persona depends on.
    #[serde(default)]
    pub requires_skills: Vec<String>,
}

/// Engine runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeDef {
    /// Workspace root override; defaults to `.wave/workspaces`.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default = "default_max_workers")]
    pub max_concurrent_workers: usize,
    #[serde(default = "default_timeout_minutes")]
    pub default_timeout_minutes: u64,
    #[serde(default)]
    pub relay: RelayDef,
    /// Directory for append-only audit traces; absent disables tracing.
    #[serde(default)]
    pub audit_dir: Option<PathBuf>,
}

impl Default for RuntimeDef {
    fn default() -> Self {
        Self {
            workspace_root: None,
            max_concurrent_workers: default_max_workers(),
            default_timeout_minutes: default_timeout_minutes(),
            relay: RelayDef::default(),
            audit_dir: None,
        }
    }
}

fn default_max_workers() -> usize {
    4
}

fn default_timeout_minutes() -> u64 {
    30
}

/// Relay summarization thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayDef {
    /// Total token budget for a run's accumulated context.
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,
    /// Percentage of the budget at which summarization kicks in.
    #[serde(default = "default_threshold_percent")]
    pub token_threshold_percent: u8,
}

impl Default for RelayDef {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            token_threshold_percent: default_threshold_percent(),
        }
    }
}

impl RelayDef {
    /// Token count at which summarization triggers.
    pub fn threshold_tokens(&self) -> u64 {
        self.token_budget
            .saturating_mul(u64::from(self.token_threshold_percent))
            / 100
    }
}

fn default_token_budget() -> u64 {
    200_000
}

fn default_threshold_percent() -> u8 {
    80
}

/// A named directory exposed to agents that declare the skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillMount {
    pub name: String,
    pub source: PathBuf,
    #[serde(default)]
    pub target: Option<PathBuf>,
}

/// Filesystem layout rooted at the project directory.
#[derive(Debug, Clone)]
pub struct WavePaths {
    root: PathBuf,
}

impl WavePaths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            root: project_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.root
    }

    fn wave_dir(&self) -> PathBuf {
        self.root.join(".wave")
    }

    pub fn state_db(&self) -> PathBuf {
        self.wave_dir().join("state.db")
    }

    pub fn workspaces(&self) -> PathBuf {
        self.wave_dir().join("workspaces")
    }

    pub fn pids(&self) -> PathBuf {
        self.wave_dir().join("pids")
    }

    pub fn traces(&self) -> PathBuf {
        self.wave_dir().join("traces")
    }

    pub fn pipelines(&self) -> PathBuf {
        self.wave_dir().join("pipelines")
    }

    pub fn personas(&self) -> PathBuf {
        self.wave_dir().join("personas")
    }

    pub fn contracts(&self) -> PathBuf {
        self.wave_dir().join("contracts")
    }

    /// Workspace root honoring the manifest override.
    pub fn workspace_root(&self, runtime: &RuntimeDef) -> PathBuf {
        runtime
            .workspace_root
            .clone()
            .unwrap_or_else(|| self.workspaces())
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
