//! Resume after crash: completed steps are not re-executed.

use crate::prelude::*;
use std::time::Duration;
use wave_adapters::MockResponse;
use wave_core::{RunStatus, StepState};
use wave_engine::{EngineError, ExecuteOptions, RunCancellation};

#[tokio::test]
async fn resume_after_crash_skips_completed_steps() {
    let mut spec = Spec::new();
    spec.adapter.push("a", ok_with_result(10));
    // Step b never finishes in the first process
    spec.adapter.push("b", MockResponse::hanging());
    let def = pipeline(
        "crashy",
        vec![step_with_output("a", &[], 0), step_with_output("b", &["a"], 0)],
    );

    let executor = spec.executor();
    let handle = tokio::spawn({
        let def = def.clone();
        async move {
            executor
                .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
                .await
        }
    });

    let run_id = spec.wait_for_run().await;
    spec.wait_for_step_state(&run_id, "a", StepState::Completed).await;
    spec.wait_for_step_state(&run_id, "b", StepState::Running).await;

    // Simulate process death: abort the engine task mid-run
    handle.abort();
    let _ = handle.await;

    // A fresh engine over a freshly opened store
    spec.reopen_store();
    let run = spec.store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Running, "crash left the run open");

    spec.adapter.script("b", vec![ok_with_result(20)]);
    let run = spec
        .executor()
        .resume(&run_id, &def, RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    // a ran once in total; b's first (hung) attempt plus the resumed one
    assert_eq!(spec.adapter.invocations("a"), 1);
    assert_eq!(spec.adapter.invocations("b"), 2);

    // The resumed engine started with b, not a
    let resumed_calls = spec.adapter.calls();
    assert_eq!(resumed_calls.last().unwrap().step_id, "b");

    let states = spec.store.get_step_states(&run_id);
    assert!(states.iter().all(|s| s.state == StepState::Completed));
}

#[tokio::test]
async fn resume_after_cancellation_continues_the_run() {
    let spec = Spec::new();
    spec.adapter
        .push("a", MockResponse::ok().with_delay(Duration::from_millis(150)));
    let def = pipeline("restartable", vec![step("a", &[]), step("b", &["a"])]);

    let executor = spec.executor();
    let handle = tokio::spawn({
        let def = def.clone();
        async move {
            executor
                .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
                .await
        }
    });

    let run_id = spec.wait_for_run().await;
    spec.wait_for_step_state(&run_id, "a", StepState::Running).await;
    spec.store.request_cancellation(&run_id, false, None).unwrap();
    let _ = handle.await.unwrap();

    assert_run_status(&spec, &run_id, RunStatus::Cancelled);

    // The same run resumes past the cancellation
    let run = spec
        .executor()
        .resume(&run_id, &def, RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(spec.adapter.invocations("a"), 1, "completed step not re-run");
    assert_eq!(spec.adapter.invocations("b"), 1);
}

#[tokio::test]
async fn resume_from_reruns_target_and_downstream() {
    let spec = Spec::new();
    let def = pipeline(
        "stagewise",
        vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])],
    );

    // Fail at c the first time
    spec.adapter.script(
        "c",
        vec![MockResponse::failing(wave_adapters::MockFailure::NonZeroExit {
            code: 1,
            stderr: "flaked".to_string(),
        })],
    );
    let executor = spec.executor();
    let err = executor
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Adapter { .. }));
    let run_id = spec.only_run().id;

    // Operator resumes from b: b and c re-run, a does not
    let run = spec
        .executor()
        .resume_from(
            &run_id,
            &def,
            "b",
            false,
            RunCancellation::new(),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(spec.adapter.invocations("a"), 1);
    assert_eq!(spec.adapter.invocations("b"), 2);
    assert_eq!(spec.adapter.invocations("c"), 2);
}

#[tokio::test]
async fn resume_from_requires_completed_dependencies_without_force() {
    let spec = Spec::new();
    let def = pipeline("gated", vec![step("a", &[]), step("b", &["a"])]);

    // Fail a immediately so nothing completes
    spec.adapter.script(
        "a",
        vec![MockResponse::failing(wave_adapters::MockFailure::NonZeroExit {
            code: 1,
            stderr: "broken".to_string(),
        })],
    );
    let _ = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap_err();
    let run_id = spec.only_run().id;

    let err = spec
        .executor()
        .resume_from(
            &run_id,
            &def,
            "b",
            false,
            RunCancellation::new(),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Usage(ref m) if m.contains("dependencies")));

    // force bypasses the gate
    let run = spec
        .executor()
        .resume_from(
            &run_id,
            &def,
            "b",
            true,
            RunCancellation::new(),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn completed_runs_cannot_be_resumed() {
    let spec = Spec::new();
    let def = pipeline("oneshot", vec![step("a", &[])]);
    let run = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    let err = spec
        .executor()
        .resume(&run.id, &def, RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Usage(ref m) if m.contains("completed")));
}
