// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DAG scheduling state machine.
//!
//! Pure bookkeeping the executor drives: a ready queue in declaration
//! order, running/completed/failed sets, promotion of dependents, and
//! unreachable-marking when a step fails. Deterministic by
//! construction so scenario tests can assert launch order.

use wave_config::Dag;

/// Lifecycle of one node inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    /// Downstream of a failed step; will never launch.
    Unreachable,
}

/// Cancellation level the scheduler observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelMode {
    #[default]
    None,
    Graceful,
    Force,
}

/// Ready-queue scheduler over a compact-index DAG.
#[derive(Debug)]
pub struct DagScheduler {
    dag: Dag,
    states: Vec<NodeState>,
    /// Ready indices, kept sorted so declaration order breaks ties.
    ready: Vec<usize>,
    running: usize,
    cancel: CancelMode,
    failed: bool,
}

impl DagScheduler {
    pub fn new(dag: Dag) -> Self {
        let mut scheduler = Self {
            states: vec![NodeState::Pending; dag.len()],
            ready: Vec::new(),
            running: 0,
            cancel: CancelMode::None,
            failed: false,
            dag,
        };
        for idx in 0..scheduler.dag.len() {
            if scheduler.dag.deps(idx).is_empty() {
                scheduler.states[idx] = NodeState::Ready;
                scheduler.ready.push(idx);
            }
        }
        scheduler
    }

    /// Mark steps completed before this engine started (resume) and
    /// promote whatever that unblocks.
    pub fn mark_already_completed(&mut self, completed: &[usize]) {
        for &idx in completed {
            self.states[idx] = NodeState::Completed;
            self.ready.retain(|&r| r != idx);
        }
        for idx in 0..self.dag.len() {
            if self.states[idx] == NodeState::Pending && self.deps_completed(idx) {
                self.states[idx] = NodeState::Ready;
                self.insert_ready(idx);
            }
        }
    }

    fn deps_completed(&self, idx: usize) -> bool {
        self.dag
            .deps(idx)
            .iter()
            .all(|&d| self.states[d] == NodeState::Completed)
    }

    fn insert_ready(&mut self, idx: usize) {
        if let Err(pos) = self.ready.binary_search(&idx) {
            self.ready.insert(pos, idx);
        }
    }

    /// Pop the next launchable step (lowest declaration index). None
    /// once cancellation is requested or a step has failed.
    pub fn next_ready(&mut self) -> Option<usize> {
        if self.cancel != CancelMode::None || self.failed {
            return None;
        }
        if self.ready.is_empty() {
            return None;
        }
        let idx = self.ready.remove(0);
        self.states[idx] = NodeState::Running;
        self.running += 1;
        Some(idx)
    }

    /// A running step completed; promote dependents whose dependencies
    /// are now all complete. Returns the newly ready indices.
    pub fn on_completed(&mut self, idx: usize) -> Vec<usize> {
        debug_assert_eq!(self.states[idx], NodeState::Running);
        self.states[idx] = NodeState::Completed;
        self.running -= 1;

        let mut newly_ready = Vec::new();
        let dependents = self.dag.dependents(idx).to_vec();
        for dependent in dependents {
            if self.states[dependent] == NodeState::Pending && self.deps_completed(dependent) {
                self.states[dependent] = NodeState::Ready;
                self.insert_ready(dependent);
                newly_ready.push(dependent);
            }
        }
        newly_ready
    }

    /// A running step will be retried: back to the ready queue.
    pub fn on_retry(&mut self, idx: usize) {
        debug_assert_eq!(self.states[idx], NodeState::Running);
        self.states[idx] = NodeState::Ready;
        self.running -= 1;
        self.insert_ready(idx);
    }

    /// A running step failed terminally. Everything transitively
    /// downstream becomes unreachable; no further steps launch.
    /// Returns the newly unreachable indices in declaration order.
    pub fn on_failed(&mut self, idx: usize) -> Vec<usize> {
        debug_assert_eq!(self.states[idx], NodeState::Running);
        self.states[idx] = NodeState::Failed;
        self.running -= 1;
        self.failed = true;

        let mut unreachable = Vec::new();
        for downstream in self.dag.downstream(idx) {
            if matches!(
                self.states[downstream],
                NodeState::Pending | NodeState::Ready
            ) {
                self.states[downstream] = NodeState::Unreachable;
                self.ready.retain(|&r| r != downstream);
                unreachable.push(downstream);
            }
        }
        unreachable
    }

    /// Observe a cancellation request. Levels only escalate.
    pub fn request_cancel(&mut self, force: bool) {
        self.cancel = match (self.cancel, force) {
            (CancelMode::Force, _) | (_, true) => CancelMode::Force,
            _ => CancelMode::Graceful,
        };
    }

    pub fn cancel_mode(&self) -> CancelMode {
        self.cancel
    }

    pub fn running(&self) -> usize {
        self.running
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn is_completed(&self, idx: usize) -> bool {
        self.states[idx] == NodeState::Completed
    }

    /// True when nothing is running and nothing more will launch.
    pub fn is_settled(&self) -> bool {
        self.running == 0
            && (self.cancel != CancelMode::None || self.failed || self.ready.is_empty())
    }

    /// True when every step ran to completion.
    pub fn all_completed(&self) -> bool {
        self.states.iter().all(|s| *s == NodeState::Completed)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
