// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event fan-out.
//!
//! Subscribers are registered before the bus is shared and receive
//! every event synchronously, in registration order. The bus never
//! drops events; subscribers that want buffering buffer themselves.
//! There is no process-global emitter: the bus is an explicit
//! dependency of the executor.

use std::sync::Arc;
use wave_core::Event;
use wave_storage::StateStore;

/// A consumer of engine events.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Synchronous fan-out to registered subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Dispatch order is registration order.
    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Dispatch one event to every subscriber.
    pub fn emit(&self, event: Event) {
        tracing::debug!(
            run_id = %event.run_id,
            state = event.label(),
            "emitting event",
        );
        for subscriber in &self.subscribers {
            subscriber.on_event(&event);
        }
    }
}

/// The always-present subscriber persisting events through the store.
///
/// Register this first so the durable record precedes any rendering.
/// Persistence failures are logged, not propagated: fan-out is
/// infallible by contract, and state-transition writes surface store
/// errors through their own calls.
pub struct StoreSubscriber {
    store: Arc<StateStore>,
}

impl StoreSubscriber {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }
}

impl Subscriber for StoreSubscriber {
    fn on_event(&self, event: &Event) {
        if let Err(e) = self.store.append_event(event.clone()) {
            tracing::error!(
                run_id = %event.run_id,
                state = event.label(),
                error = %e,
                "failed to persist event",
            );
        }
    }
}

/// Optional audit subscriber appending newline-delimited JSON to
/// `{trace_dir}/{run_id}.ndjson`.
///
/// The same records are suitable for piping to external consumers;
/// write failures are logged and never interrupt the run.
pub struct TraceSubscriber {
    trace_dir: std::path::PathBuf,
}

impl TraceSubscriber {
    pub fn new(trace_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            trace_dir: trace_dir.into(),
        }
    }

    fn append(&self, event: &Event) -> std::io::Result<()> {
        use std::io::Write;
        std::fs::create_dir_all(&self.trace_dir)?;
        let path = self
            .trace_dir
            .join(format!("{}.ndjson", event.run_id));
        let mut line = serde_json::to_vec(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push(b'\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(&line)
    }
}

impl Subscriber for TraceSubscriber {
    fn on_event(&self, event: &Event) {
        if let Err(e) = self.append(event) {
            tracing::warn!(
                run_id = %event.run_id,
                error = %e,
                "failed to append audit trace",
            );
        }
    }
}

/// Collects events in memory for assertions.
#[cfg(any(test, feature = "test-support"))]
pub struct CollectingSubscriber {
    events: parking_lot::Mutex<Vec<Event>>,
}

#[cfg(any(test, feature = "test-support"))]
impl CollectingSubscriber {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(Event::label).collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for CollectingSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Subscriber for CollectingSubscriber {
    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
