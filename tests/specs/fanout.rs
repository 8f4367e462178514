//! Fan-out/fan-in: parallel branches overlap, the join waits for both.

use crate::prelude::*;
use std::time::Duration;
use wave_adapters::MockResponse;
use wave_core::RunStatus;
use wave_engine::{ExecuteOptions, RunCancellation};

#[tokio::test]
async fn branches_run_concurrently_and_join_waits_for_both() {
    let spec = Spec::new();
    // Delays keep both branches in flight long enough to observe overlap
    spec.adapter
        .push("left", MockResponse::ok().with_delay(Duration::from_millis(100)));
    spec.adapter
        .push("right", MockResponse::ok().with_delay(Duration::from_millis(100)));

    let def = pipeline(
        "fan",
        vec![
            step("root", &[]),
            step("left", &["root"]),
            step("right", &["root"]),
            step("join", &["left", "right"]),
        ],
    );

    let run = spec
        .executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let seq = spec.event_seq();
    let pos = |label: &str, id: &str| {
        seq.iter()
            .position(|(l, s)| *l == label && s.as_deref() == Some(id))
            .unwrap_or_else(|| panic!("no {} for {}", label, id))
    };

    // Both branches started before either completed: they overlapped
    assert!(pos("step:started", "left") < pos("step:completed", "left"));
    assert!(pos("step:started", "right") < pos("step:completed", "left"));
    assert!(pos("step:started", "left") < pos("step:completed", "right"));

    // The join began only after both branches completed
    let join_start = pos("step:started", "join");
    assert!(pos("step:completed", "left") < join_start);
    assert!(pos("step:completed", "right") < join_start);
}

#[tokio::test]
async fn concurrency_never_exceeds_the_worker_cap() {
    let mut manifest = default_manifest();
    manifest.runtime.max_concurrent_workers = 2;
    let spec = Spec::with_manifest(manifest);

    let mut steps = vec![step("root", &[])];
    for id in ["w1", "w2", "w3", "w4"] {
        spec.adapter
            .push(id, MockResponse::ok().with_delay(Duration::from_millis(40)));
        steps.push(step(id, &["root"]));
    }

    let run = spec
        .executor()
        .execute(
            &pipeline("wide", steps),
            "x",
            RunCancellation::new(),
            &ExecuteOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    // Replay the event stream counting in-flight steps
    let mut in_flight: i64 = 0;
    let mut peak = 0;
    for (label, _) in spec.event_seq() {
        match label {
            "step:started" => {
                in_flight += 1;
                peak = peak.max(in_flight);
            }
            "step:completed" | "step:failed" => in_flight -= 1,
            _ => {}
        }
    }
    assert!(peak <= 2, "worker cap exceeded: peak {}", peak);
    assert!(peak == 2, "expected the cap to be reached");
}

#[tokio::test]
async fn ready_ties_break_in_declaration_order() {
    let spec = Spec::new();
    let def = pipeline(
        "ordered",
        vec![
            step("root", &[]),
            step("zeta", &["root"]),
            step("alpha", &["root"]),
        ],
    );

    // Single worker so launch order is fully observable
    let mut manifest = default_manifest();
    manifest.runtime.max_concurrent_workers = 1;
    let spec = Spec {
        manifest,
        ..spec
    };

    spec.executor()
        .execute(&def, "x", RunCancellation::new(), &ExecuteOptions::default())
        .await
        .unwrap();

    let order: Vec<String> = spec
        .adapter
        .calls()
        .iter()
        .map(|c| c.step_id.to_string())
        .collect();
    // zeta declared before alpha, so zeta launches first
    assert_eq!(order, vec!["root", "zeta", "alpha"]);
}
