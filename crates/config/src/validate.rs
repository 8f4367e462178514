// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-checks between a manifest and a pipeline definition.

use crate::dag::Dag;
use crate::error::ConfigError;
use crate::manifest::Manifest;
use crate::pipeline::{MemoryStrategy, PipelineDef};
use std::path::Path;

/// Validate a pipeline against a manifest, returning the derived DAG.
///
/// `personas_root` locates persona prompt files (`.wave/personas/`);
/// pass `None` to skip file-existence checks (in-memory configs in
/// tests).
pub fn validate(
    manifest: &Manifest,
    pipeline: &PipelineDef,
    personas_root: Option<&Path>,
) -> Result<Dag, ConfigError> {
    if manifest.runtime.max_concurrent_workers == 0 {
        return Err(ConfigError::InvalidConcurrency);
    }
    let threshold = manifest.runtime.relay.token_threshold_percent;
    if threshold == 0 || threshold > 100 {
        return Err(ConfigError::InvalidThreshold(threshold));
    }

    let dag = Dag::build(pipeline)?;

    for step in &pipeline.steps {
        if manifest.get_persona(&step.persona).is_none() {
            return Err(ConfigError::UnknownPersona {
                step: step.id.clone(),
                persona: step.persona.clone(),
            });
        }
        check_persona(manifest, &step.persona, personas_root)?;

        for injection in &step.inject {
            if !step.depends_on.contains(&injection.from_step) {
                return Err(ConfigError::InjectionNotDependency {
                    step: step.id.clone(),
                    from_step: injection.from_step.clone(),
                    artifact: injection.artifact.clone(),
                });
            }
            let declared = pipeline
                .get_step(&injection.from_step)
                .map(|s| s.outputs.iter().any(|o| o.name == injection.artifact))
                .unwrap_or(false);
            if !declared {
                return Err(ConfigError::UnknownInjectionArtifact {
                    step: step.id.clone(),
                    from_step: injection.from_step.clone(),
                    artifact: injection.artifact.clone(),
                });
            }
        }
    }

    let needs_summarizer = pipeline
        .steps
        .iter()
        .any(|s| s.memory == MemoryStrategy::SummarizeToCheckpoint);
    if needs_summarizer {
        match manifest.summarizer() {
            Some(_) => check_persona(manifest, crate::manifest::SUMMARIZER_PERSONA, personas_root)?,
            None => return Err(ConfigError::MissingSummarizer),
        }
    }

    Ok(dag)
}

/// Check one persona's adapter binding and prompt source.
fn check_persona(
    manifest: &Manifest,
    persona_name: &str,
    personas_root: Option<&Path>,
) -> Result<(), ConfigError> {
    let Some(persona) = manifest.get_persona(persona_name) else {
        // Callers resolve the persona first; unreachable in practice.
        return Ok(());
    };

    if manifest.get_adapter(&persona.adapter).is_none() {
        return Err(ConfigError::UnknownAdapter {
            persona: persona_name.to_string(),
            adapter: persona.adapter.clone(),
        });
    }

    match (&persona.system_prompt, &persona.prompt_file) {
        (Some(_), _) => Ok(()),
        (None, Some(file)) => {
            if let Some(root) = personas_root {
                let path = root.join(file);
                if !path.is_file() {
                    return Err(ConfigError::MissingPromptFile {
                        persona: persona_name.to_string(),
                        path,
                    });
                }
            }
            Ok(())
        }
        (None, None) => Err(ConfigError::MissingPrompt(persona_name.to_string())),
    }
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
