// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preflight: verify required tools and skills before spawning agents.
//!
//! Tools are binaries a persona declares via `requires_tools`, resolved
//! on PATH. Skills are named mounts that must be declared in the
//! manifest with an existing source directory. Failures are fatal but
//! carry recovery hints for the consumer to surface.

use crate::error::EngineError;
use std::collections::BTreeSet;
use std::path::Path;
use wave_config::{Manifest, MemoryStrategy, PipelineDef, SUMMARIZER_PERSONA};

/// Check every persona the pipeline will invoke.
pub fn check(
    manifest: &Manifest,
    pipeline: &PipelineDef,
    project_root: &Path,
) -> Result<(), EngineError> {
    let mut personas: BTreeSet<&str> =
        pipeline.steps.iter().map(|s| s.persona.as_str()).collect();
    if pipeline
        .steps
        .iter()
        .any(|s| s.memory == MemoryStrategy::SummarizeToCheckpoint)
    {
        personas.insert(SUMMARIZER_PERSONA);
    }

    let mut missing_tools = BTreeSet::new();
    let mut missing_skills = BTreeSet::new();

    for name in personas {
        let Some(persona) = manifest.get_persona(name) else {
            continue; // load-time validation already rejected this
        };
        for tool in &persona.requires_tools {
            if !tool_on_path(tool) {
                missing_tools.insert(tool.clone());
            }
        }
        for skill in &persona.requires_skills {
            let declared = manifest.skills.iter().find(|s| &s.name == skill);
            let present = declared
                .map(|s| resolve(project_root, &s.source).is_dir())
                .unwrap_or(false);
            if !present {
                missing_skills.insert(skill.clone());
            }
        }
    }

    if missing_tools.is_empty() && missing_skills.is_empty() {
        return Ok(());
    }

    let missing_tools: Vec<String> = missing_tools.into_iter().collect();
    let missing_skills: Vec<String> = missing_skills.into_iter().collect();
    let recovery_hints = recovery_hints(&missing_tools, &missing_skills);
    Err(EngineError::Preflight {
        missing_tools,
        missing_skills,
        recovery_hints,
    })
}

/// Human-actionable suggestions for a preflight failure.
pub fn recovery_hints(missing_tools: &[String], missing_skills: &[String]) -> Vec<String> {
    let mut hints = Vec::new();
    for tool in missing_tools {
        hints.push(format!("install '{}' and ensure it is on PATH", tool));
    }
    for skill in missing_skills {
        hints.push(format!(
            "declare skill '{}' in the manifest with an existing source directory",
            skill
        ));
    }
    hints
}

fn resolve(project_root: &Path, source: &Path) -> std::path::PathBuf {
    if source.is_absolute() {
        source.to_path_buf()
    } else {
        project_root.join(source)
    }
}

/// Resolve a binary name against PATH.
fn tool_on_path(tool: &str) -> bool {
    if tool.contains('/') {
        return Path::new(tool).is_file();
    }
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join(tool).is_file())
}

#[cfg(test)]
#[path = "preflight_tests.rs"]
mod tests;
