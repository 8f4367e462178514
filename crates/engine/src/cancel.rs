// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-level run cancellation.
//!
//! Graceful stops launching new steps but lets running ones settle;
//! force additionally cancels running step contexts, which the adapter
//! turns into a signal to the agent's process group. Force implies
//! graceful.

use tokio_util::sync::CancellationToken;

/// Shared cancellation state for one run.
#[derive(Debug, Clone, Default)]
pub struct RunCancellation {
    graceful: CancellationToken,
    force: CancellationToken,
}

impl RunCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_graceful(&self) {
        self.graceful.cancel();
    }

    pub fn cancel_force(&self) {
        self.graceful.cancel();
        self.force.cancel();
    }

    pub fn is_graceful_requested(&self) -> bool {
        self.graceful.is_cancelled()
    }

    pub fn is_force_requested(&self) -> bool {
        self.force.is_cancelled()
    }

    /// Token step contexts derive from; cancelled only on force.
    pub fn step_token(&self) -> CancellationToken {
        self.force.child_token()
    }

    /// Resolves when graceful (or force) cancellation is requested.
    pub async fn graceful_requested(&self) {
        self.graceful.cancelled().await
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
