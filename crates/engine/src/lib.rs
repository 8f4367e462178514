// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Wave pipeline execution engine

mod bus;
mod cancel;
mod contract;
mod error;
mod executor;
mod preflight;
mod relay;
mod scheduler;
mod supervisor;
mod workspace;

pub use bus::{EventBus, StoreSubscriber, Subscriber, TraceSubscriber};
#[cfg(any(test, feature = "test-support"))]
pub use bus::CollectingSubscriber;
pub use cancel::RunCancellation;
pub use contract::{validate_outputs, ContractOutcome};
pub use error::EngineError;
pub use executor::{ExecuteOptions, Executor};
pub use preflight::check as preflight_check;
pub use relay::{
    assemble_prompt, needs_checkpoint, summarizer_prompt, UpstreamArtifact, CHECKPOINT_ARTIFACT,
};
pub use scheduler::{CancelMode, DagScheduler};
pub use supervisor::{mint_run_id, Supervisor};
pub use workspace::{StepWorkspace, WorkspaceError, WorkspaceManager};
