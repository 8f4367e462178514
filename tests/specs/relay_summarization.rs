//! Relay summarization: once the token budget nears exhaustion, a
//! summarizer checkpoint replaces the verbose history.

use crate::prelude::*;
use wave_adapters::MockResponse;
use wave_config::MemoryStrategy;
use wave_core::{RunStatus, StepId};
use wave_engine::{ExecuteOptions, RunCancellation, CHECKPOINT_ARTIFACT};

fn summarizing_pipeline() -> wave_config::PipelineDef {
    let mut steps = Vec::new();
    let ids = ["s1", "s2", "s3", "s4"];
    for (i, id) in ids.iter().enumerate() {
        let deps: &[&str] = if i == 0 { &[] } else { &ids[i - 1..i] };
        let mut def = step_with_output(id, deps, 0);
        def.memory = MemoryStrategy::SummarizeToCheckpoint;
        steps.push(def);
    }
    pipeline("longhaul", steps)
}

fn spec_with_tight_budget() -> Spec {
    let mut manifest = default_manifest();
    manifest.runtime.relay.token_budget = 100;
    manifest.runtime.relay.token_threshold_percent = 10;
    Spec::with_manifest(manifest)
}

/// Seed responses: each step writes a large artifact and reports
/// tokens that cross the 10-token threshold after s2.
fn seed_responses(spec: &Spec) {
    let big_artifact = format!(r#"{{"log":"{}"}}"#, "verbose output ".repeat(200));
    for id in ["s1", "s2", "s3", "s4"] {
        spec.adapter.push(
            id,
            MockResponse::with_output(r#"{"ok":true}"#)
                .with_tokens(8)
                .with_file("result.json", &big_artifact),
        );
    }
    for id in ["s3", "s4"] {
        spec.adapter.push(
            &format!("{}#summarizer", id),
            MockResponse::with_output(r#"{"result":"plan agreed; artifacts written"}"#)
                .with_tokens(3),
        );
    }
}

#[tokio::test]
async fn checkpoint_replaces_verbose_history_past_the_threshold() {
    let spec = spec_with_tight_budget();
    seed_responses(&spec);

    let run = spec
        .executor()
        .execute(
            &summarizing_pipeline(),
            "build it",
            RunCancellation::new(),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    // The summarizer persona ran for s3 (cumulative 16 tokens > 10)
    let summarizer_calls = spec.adapter.calls_for_persona("summarizer");
    assert!(!summarizer_calls.is_empty());
    assert_eq!(summarizer_calls[0].step_id, "s3#summarizer");

    // The checkpoint is recorded as an artifact on the consuming step
    let checkpoint = spec
        .store
        .get_artifact(&run.id, &StepId::new("s3"), CHECKPOINT_ARTIFACT)
        .expect("checkpoint artifact recorded for s3");
    let text = std::fs::read_to_string(&checkpoint.path).unwrap();
    assert_eq!(text, "plan agreed; artifacts written");

    // s2 had no checkpoint yet (8 tokens < 10)
    assert!(spec
        .store
        .get_artifact(&run.id, &StepId::new("s2"), CHECKPOINT_ARTIFACT)
        .is_none());

    // s3's prompt carries the checkpoint instead of the verbose logs,
    // so it is substantially shorter than s2's
    let prompt_of = |id: &str| {
        spec.adapter
            .calls()
            .iter()
            .find(|c| c.step_id == id)
            .unwrap()
            .user_prompt
            .clone()
    };
    let s2_prompt = prompt_of("s2");
    let s3_prompt = prompt_of("s3");
    assert!(s2_prompt.contains("verbose output"));
    assert!(s3_prompt.contains("plan agreed"));
    assert!(!s3_prompt.contains("verbose output"));
    assert!(s3_prompt.len() < s2_prompt.len());

    // The event stream records the compression
    assert!(spec
        .event_seq()
        .iter()
        .any(|(l, s)| *l == "relay:checkpoint" && s.as_deref() == Some("s3")));
}

#[tokio::test]
async fn below_threshold_no_summarizer_runs() {
    let mut manifest = default_manifest();
    manifest.runtime.relay.token_budget = 1_000_000;
    manifest.runtime.relay.token_threshold_percent = 90;
    let spec = Spec::with_manifest(manifest);
    seed_responses(&spec);

    let run = spec
        .executor()
        .execute(
            &summarizing_pipeline(),
            "build it",
            RunCancellation::new(),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert!(spec.adapter.calls_for_persona("summarizer").is_empty());
    assert!(spec
        .store
        .get_artifact(&run.id, &StepId::new("s3"), CHECKPOINT_ARTIFACT)
        .is_none());
}

#[tokio::test]
async fn summarizer_failure_degrades_to_verbose_context() {
    let spec = spec_with_tight_budget();
    seed_responses(&spec);
    // Replace s3's summarizer response with a failure
    spec.adapter.script(
        "s3#summarizer",
        vec![MockResponse::failing(wave_adapters::MockFailure::NonZeroExit {
            code: 1,
            stderr: "summarizer crashed".to_string(),
        })],
    );

    let run = spec
        .executor()
        .execute(
            &summarizing_pipeline(),
            "build it",
            RunCancellation::new(),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();

    // The run still completes; s3 fell back to the verbose history
    assert_eq!(run.status, RunStatus::Completed);
    let s3_prompt = spec
        .adapter
        .calls()
        .iter()
        .find(|c| c.step_id == "s3")
        .unwrap()
        .user_prompt
        .clone();
    assert!(s3_prompt.contains("verbose output"));
}
