//! Graceful and forcible cancellation.

use crate::prelude::*;
use std::time::Duration;
use wave_adapters::MockResponse;
use wave_core::{RunStatus, StepState};
use wave_engine::{EngineError, ExecuteOptions, RunCancellation};

#[tokio::test]
async fn graceful_cancel_lets_running_step_finish() {
    let spec = Spec::new();
    spec.adapter
        .push("a", MockResponse::ok().with_delay(Duration::from_millis(300)));
    let def = pipeline("cancellable", vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])]);

    let executor = spec.executor();
    let handle = tokio::spawn({
        let cancel = RunCancellation::new();
        async move {
            executor
                .execute(&def, "x", cancel, &ExecuteOptions::default())
                .await
        }
    });

    // Operator path: write the cancellation request into the store
    // while step a is still running.
    let run_id = spec.wait_for_run().await;
    spec.wait_for_step_state(&run_id, "a", StepState::Running).await;
    spec.store
        .request_cancellation(&run_id, false, Some("operator".to_string()))
        .unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, EngineError::Cancelled { force: false }));

    assert_run_status(&spec, &run_id, RunStatus::Cancelled);
    let run = spec.store.get_run(&run_id).unwrap();
    assert!(run.completed_at.is_some());

    let states = spec.store.get_step_states(&run_id);
    let state_of = |id: &str| states.iter().find(|s| s.step_id == id).unwrap().state;
    // The running step completed; the rest never started
    assert_eq!(state_of("a"), StepState::Completed);
    assert_eq!(state_of("b"), StepState::Pending);
    assert_eq!(state_of("c"), StepState::Pending);
    assert_eq!(spec.adapter.invocations("b"), 0);

    // Completed work is retained
    let seq = spec.event_seq();
    assert!(seq.iter().any(|(l, s)| *l == "step:completed" && s.as_deref() == Some("a")));
    assert_eq!(seq.last().unwrap().0, "run:cancelled");
}

#[tokio::test]
async fn force_cancel_kills_the_running_step() {
    let spec = Spec::new();
    spec.adapter.push("a", MockResponse::hanging());
    let def = pipeline("cancellable", vec![step("a", &[]), step("b", &["a"])]);

    let executor = spec.executor();
    let handle = tokio::spawn(async move {
        executor
            .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
            .await
    });

    let run_id = spec.wait_for_run().await;
    spec.wait_for_step_state(&run_id, "a", StepState::Running).await;
    spec.store.request_cancellation(&run_id, true, None).unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, EngineError::Cancelled { force: true }));

    assert_run_status(&spec, &run_id, RunStatus::Cancelled);
    let states = spec.store.get_step_states(&run_id);
    let a = states.iter().find(|s| s.step_id == "a").unwrap();
    assert_eq!(a.state, StepState::Failed);
    assert!(a.last_error.as_deref().unwrap().contains("cancelled"));

    let b = states.iter().find(|s| s.step_id == "b").unwrap();
    assert_eq!(b.state, StepState::Pending);
    assert_eq!(spec.adapter.invocations("b"), 0);

    // No pidfile lingers for this run
    let pid_dir = spec.dir.path().join(".wave/pids");
    let leftover = std::fs::read_dir(&pid_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn force_overrides_an_earlier_graceful_request() {
    let spec = Spec::new();
    spec.adapter.push("a", MockResponse::hanging());
    let def = pipeline("cancellable", vec![step("a", &[])]);

    let executor = spec.executor();
    let handle = tokio::spawn(async move {
        executor
            .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
            .await
    });

    let run_id = spec.wait_for_run().await;
    spec.wait_for_step_state(&run_id, "a", StepState::Running).await;
    spec.store.request_cancellation(&run_id, false, None).unwrap();
    // The step hangs, so only escalation can end the run
    spec.store.request_cancellation(&run_id, true, None).unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, EngineError::Cancelled { force: true }));
    assert_run_status(&spec, &run_id, RunStatus::Cancelled);
}

#[tokio::test]
async fn signal_style_cancellation_through_the_handle() {
    let spec = Spec::new();
    spec.adapter
        .push("a", MockResponse::ok().with_delay(Duration::from_millis(200)));
    let def = pipeline("cancellable", vec![step("a", &[]), step("b", &["a"])]);

    let cancel = RunCancellation::new();
    let executor = spec.executor();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            executor
                .execute(&def, "x", cancel, &ExecuteOptions::default())
                .await
        }
    });

    let run_id = spec.wait_for_run().await;
    spec.wait_for_step_state(&run_id, "a", StepState::Running).await;
    cancel.cancel_graceful();

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, EngineError::Cancelled { force: false }));
    assert_run_status(&spec, &run_id, RunStatus::Cancelled);
    assert_eq!(spec.adapter.invocations("b"), 0);
}
