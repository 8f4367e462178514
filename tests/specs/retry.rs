//! Contract-driven retry: fail twice, then succeed.

use crate::prelude::*;
use wave_adapters::MockResponse;
use wave_core::{RunStatus, StepState};
use wave_engine::{ExecuteOptions, RunCancellation};

#[tokio::test]
async fn flaky_step_retries_then_succeeds() {
    let spec = Spec::new();
    // First two attempts produce no artifact: contract invalid.
    // Third writes the declared output.
    spec.adapter.script(
        "flaky",
        vec![
            MockResponse::with_output(r#"{"ok":false}"#),
            MockResponse::with_output(r#"{"ok":false}"#),
            ok_with_result(15),
        ],
    );
    let def = pipeline("retrydemo", vec![step_with_output("flaky", &[], 2)]);

    let run = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(spec.adapter.invocations("flaky"), 3);

    let states = spec.store.get_step_states(&run.id);
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].state, StepState::Completed);
    assert_eq!(states[0].retry_count, 2);

    // Exactly one completed artifact
    let artifacts = spec.store.get_artifacts(&run.id);
    assert_eq!(artifacts.len(), 1);

    // Observed lifecycle: started/retrying interleaved, one completion
    let labels: Vec<&str> = spec
        .event_seq()
        .iter()
        .filter(|(l, _)| l.starts_with("step:"))
        .map(|(l, _)| *l)
        .collect();
    assert_eq!(
        labels,
        vec![
            "step:started",
            "step:retrying",
            "step:started",
            "step:retrying",
            "step:started",
            "step:completed",
        ]
    );
}

#[tokio::test]
async fn retry_budget_exhaustion_fails_step_and_run() {
    let spec = Spec::new();
    // Never writes the artifact: every attempt fails the contract
    let def = pipeline("retrydemo", vec![step_with_output("flaky", &[], 2)]);

    let err = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 6);

    // max_retries=2 allows three attempts total
    assert_eq!(spec.adapter.invocations("flaky"), 3);

    let run = spec.only_run();
    assert_eq!(run.status, RunStatus::Failed);
    let states = spec.store.get_step_states(&run.id);
    assert_eq!(states[0].state, StepState::Failed);
    assert_eq!(states[0].retry_count, 2);
    assert!(states[0].last_error.as_deref().unwrap().contains("result"));
}

#[tokio::test]
async fn fail_policy_skips_the_retry_budget() {
    let spec = Spec::new();
    let mut def_step = step_with_output("strict", &[], 3);
    def_step.contract.on_failure = wave_config::OnFailure::Fail;
    let def = pipeline("strictdemo", vec![def_step]);

    let err = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 6);
    assert_eq!(spec.adapter.invocations("strict"), 1);
}

#[tokio::test]
async fn retry_reuses_the_same_prompt() {
    let spec = Spec::new();
    spec.adapter.script(
        "flaky",
        vec![MockResponse::with_output("{}"), ok_with_result(5)],
    );
    let def = pipeline("retrydemo", vec![step_with_output("flaky", &[], 1)]);

    spec.executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    let calls = spec.adapter.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].user_prompt, calls[1].user_prompt);
    assert_eq!(calls[0].workdir, calls[1].workdir, "workspace preserved");
}
