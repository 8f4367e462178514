//! Cross-cutting store properties observed through full engine runs.

use crate::prelude::*;
use std::sync::Arc;
use wave_core::{RunStatus, StepId};
use wave_engine::{ExecuteOptions, RunCancellation};

#[tokio::test]
async fn events_persist_once_in_ascending_order() {
    let spec = Spec::new();
    let def = pipeline(
        "evented",
        vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])],
    );

    let run = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    let persisted = spec.store.get_events(&run.id);
    // Strictly ascending ids, starting at 1
    assert_eq!(persisted[0].id, 1);
    assert!(persisted.windows(2).all(|w| w[0].id < w[1].id));

    // One persisted record per emitted event: the collector and the
    // store observed the same stream
    assert_eq!(persisted.len(), spec.collector.events().len());
    let persisted_labels: Vec<&str> = persisted.iter().map(|e| e.event.label()).collect();
    assert_eq!(persisted_labels, spec.collector.labels());
}

#[tokio::test]
async fn concurrent_runs_keep_independent_event_streams() {
    let spec = Spec::new();
    let executor = Arc::new(spec.executor());

    let mut handles = Vec::new();
    for name in ["alpha", "beta", "gamma"] {
        let executor = Arc::clone(&executor);
        let def = pipeline(name, vec![step("a", &[]), step("b", &["a"])]);
        handles.push(tokio::spawn(async move {
            executor
                .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let runs = spec.store.list_runs();
    assert_eq!(runs.len(), 3);
    for run in &runs {
        assert_eq!(run.status, RunStatus::Completed);
        let events = spec.store.get_events(&run.id);
        assert_eq!(events[0].id, 1);
        assert!(events.windows(2).all(|w| w[0].id < w[1].id));
        assert!(events.iter().all(|e| e.event.run_id == run.id));
    }

    let recent = spec.store.list_recent_pipelines(10);
    assert_eq!(recent.len(), 3);
}

#[tokio::test]
async fn artifact_records_are_write_once_across_the_engine() {
    let spec = Spec::new();
    spec.adapter.push("a", ok_with_result(5));
    let def = pipeline("artifacty", vec![step_with_output("a", &[], 0)]);

    let run = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    let artifact = spec
        .store
        .get_artifact(&run.id, &StepId::new("a"), "result")
        .unwrap();

    // A duplicate record is rejected and the stored path unchanged
    let mut dup = artifact.clone();
    dup.path = "/elsewhere".into();
    assert!(spec.store.record_artifact(dup).is_err());
    let unchanged = spec
        .store
        .get_artifact(&run.id, &StepId::new("a"), "result")
        .unwrap();
    assert_eq!(unchanged.path, artifact.path);
}

#[tokio::test]
async fn status_reads_observe_prior_writes() {
    let spec = Spec::new();
    let def = pipeline("linearized", vec![step("a", &[])]);

    let run = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    // A reader observing the terminal status also observes every step
    // state and artifact written before it
    assert_eq!(spec.store.get_run(&run.id).unwrap().status, RunStatus::Completed);
    let states = spec.store.get_step_states(&run.id);
    assert!(states
        .iter()
        .all(|s| s.state == wave_core::StepState::Completed));
}

#[tokio::test]
async fn terminal_runs_reject_further_transitions() {
    let spec = Spec::new();
    let def = pipeline("sealed", vec![step("a", &[])]);
    let run = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    let err = spec
        .store
        .update_run_status(&run.id, RunStatus::Failed, None, 0, None)
        .unwrap_err();
    assert!(matches!(err, wave_storage::StoreError::TerminalRun { .. }));
}
