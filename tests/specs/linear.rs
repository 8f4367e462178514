//! A linear three-step pipeline runs to completion.

use crate::prelude::*;
use wave_core::{RunStatus, StepState};
use wave_engine::{ExecuteOptions, RunCancellation};

#[tokio::test]
async fn linear_pipeline_completes_with_artifacts_and_events() {
    let spec = Spec::new();
    for (id, tokens) in [("a", 10), ("b", 20), ("c", 30)] {
        spec.adapter.push(id, ok_with_result(tokens));
    }
    let def = pipeline(
        "demo",
        vec![
            step_with_output("a", &[], 0),
            step_with_output("b", &["a"], 0),
            step_with_output("c", &["b"], 0),
        ],
    );

    let run = spec
        .executor()
        .execute(&def, "hello", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.input, "hello");
    assert_eq!(run.total_tokens, 60);
    assert!(run.completed_at.is_some());

    // Exactly three completed step states
    let states = spec.store.get_step_states(&run.id);
    assert_eq!(states.len(), 3);
    assert!(states.iter().all(|s| s.state == StepState::Completed));
    assert!(states.iter().all(|s| s.retry_count == 0));

    // One artifact per step, recorded at the workspace path
    let artifacts = spec.store.get_artifacts(&run.id);
    assert_eq!(artifacts.len(), 3);
    for artifact in &artifacts {
        assert_eq!(artifact.name, "result");
        assert!(artifact.path.is_file());
        assert!(artifact.size_bytes > 0);
    }

    // Per-step started and completed events, in dependency order
    let seq = spec.event_seq();
    for id in ["a", "b", "c"] {
        let started = seq
            .iter()
            .position(|(l, s)| *l == "step:started" && s.as_deref() == Some(id));
        let completed = seq
            .iter()
            .position(|(l, s)| *l == "step:completed" && s.as_deref() == Some(id));
        assert!(started.unwrap() < completed.unwrap(), "step {}", id);
    }

    // Steps ran serially: b starts only after a completes
    let a_done = seq
        .iter()
        .position(|(l, s)| *l == "step:completed" && s.as_deref() == Some("a"))
        .unwrap();
    let b_start = seq
        .iter()
        .position(|(l, s)| *l == "step:started" && s.as_deref() == Some("b"))
        .unwrap();
    assert!(a_done < b_start);

    // The persisted stream matches what subscribers observed
    let persisted = spec.store.get_events(&run.id);
    assert_eq!(persisted.len(), seq.len());
    assert!(persisted.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn run_id_embeds_pipeline_name_and_validates() {
    let spec = Spec::new();
    let def = pipeline("demo", vec![step("a", &[])]);

    let run = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    assert!(run.id.as_str().starts_with("demo-"));
    wave_core::RunId::validate(run.id.as_str()).unwrap();
}

#[tokio::test]
async fn step_workspaces_are_partitioned_per_step() {
    let spec = Spec::new();
    let def = pipeline("demo", vec![step("a", &[]), step("b", &["a"])]);

    let run = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    let calls = spec.adapter.calls();
    let dirs: Vec<_> = calls.iter().map(|c| c.workdir.clone()).collect();
    assert_eq!(dirs.len(), 2);
    assert_ne!(dirs[0], dirs[1]);
    for dir in dirs {
        assert!(dir.starts_with(spec.dir.path().join(".wave/workspaces")));
        assert!(dir.to_string_lossy().contains(run.id.as_str()));
    }
}
