// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay: builds each step's prompt from the run input and upstream
//! artifacts, compressing the history into a summarized checkpoint
//! when the token budget nears exhaustion.

use wave_config::{MemoryStrategy, RelayDef};
use wave_core::StepId;

/// Artifact name the relay records summarized checkpoints under.
pub const CHECKPOINT_ARTIFACT: &str = "relay-checkpoint.md";

/// An upstream artifact loaded for prompt assembly.
#[derive(Debug, Clone)]
pub struct UpstreamArtifact {
    pub step_id: StepId,
    pub name: String,
    pub text: String,
}

/// Whether cumulative usage has crossed the summarization threshold.
pub fn needs_checkpoint(relay: &RelayDef, cumulative_tokens: u64) -> bool {
    cumulative_tokens >= relay.threshold_tokens()
}

/// Assemble the user prompt for a step.
///
/// `checkpoint` substitutes for the verbose upstream history when the
/// memory strategy summarizes; it is ignored for other strategies.
pub fn assemble_prompt(
    step_prompt: &str,
    run_input: &str,
    strategy: MemoryStrategy,
    upstream: &[UpstreamArtifact],
    checkpoint: Option<&str>,
) -> String {
    let mut prompt = String::with_capacity(step_prompt.len() + run_input.len() + 64);
    prompt.push_str(step_prompt.trim_end());
    prompt.push_str("\n\n## Input\n\n");
    prompt.push_str(run_input);
    prompt.push('\n');

    match strategy {
        MemoryStrategy::Fresh => {}
        MemoryStrategy::Incremental => push_upstream(&mut prompt, upstream),
        MemoryStrategy::SummarizeToCheckpoint => match checkpoint {
            Some(summary) => {
                prompt.push_str("\n## Context checkpoint\n\n");
                prompt.push_str(summary.trim_end());
                prompt.push('\n');
            }
            None => push_upstream(&mut prompt, upstream),
        },
    }

    prompt
}

fn push_upstream(prompt: &mut String, upstream: &[UpstreamArtifact]) {
    if upstream.is_empty() {
        return;
    }
    prompt.push_str("\n## Upstream artifacts\n");
    for artifact in upstream {
        prompt.push_str(&format!("\n### {}/{}\n\n", artifact.step_id, artifact.name));
        prompt.push_str(artifact.text.trim_end());
        prompt.push('\n');
    }
}

/// Prompt handed to the summarizer persona.
pub fn summarizer_prompt(run_input: &str, upstream: &[UpstreamArtifact]) -> String {
    let mut prompt = String::from(
        "Compress the pipeline context below into a checkpoint for the next step. \
         Keep decisions, produced artifacts, and open items; drop everything else.\n",
    );
    prompt.push_str("\n## Original input\n\n");
    prompt.push_str(run_input);
    prompt.push('\n');
    push_upstream(&mut prompt, upstream);
    prompt
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
