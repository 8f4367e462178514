// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for invoking external agent binaries.

pub mod agent;
pub mod pidfile;

pub use agent::{
    AdapterError, AgentAdapter, InvocationOutcome, InvocationRequest, ProcessAgentAdapter,
};

#[cfg(any(test, feature = "test-support"))]
pub use agent::{MockAgentAdapter, MockFailure, MockResponse};
