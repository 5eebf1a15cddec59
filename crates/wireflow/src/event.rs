// Copyright 2026 Wireflow contributors

//! Lifecycle events.
//!
//! The engine emits one event per scheduling milestone, in real time. This
//! stream is the sole externally visible execution trace - visualization
//! and observability layers consume it without touching the value store.
//!
//! Events from nested composite runs carry a `scope` path such as
//! `"outer/inner"`, attributing inner-node activity to the composite that
//! spawned it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::engine::RunStatus;
use crate::value::Value;

/// A single execution lifecycle event.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// A run (or nested composite run) started.
    RunStarted {
        /// Run identifier.
        run_id: String,
        /// Graph name.
        graph: String,
        /// Nesting path; the graph name for top-level runs.
        scope: String,
    },
    /// A run finished, in any terminal status.
    RunFinished {
        /// Run identifier.
        run_id: String,
        /// Nesting path.
        scope: String,
        /// Terminal status.
        status: RunStatus,
        /// Wall-clock duration.
        duration: Duration,
    },
    /// A node was selected for execution.
    NodeStarted {
        /// Run identifier.
        run_id: String,
        /// Nesting path.
        scope: String,
        /// Node name.
        node: String,
    },
    /// A node finished executing (or was served from cache).
    NodeFinished {
        /// Run identifier.
        run_id: String,
        /// Nesting path.
        scope: String,
        /// Node name.
        node: String,
        /// Wall-clock duration of the execution (zero-ish on cache hits).
        duration: Duration,
        /// True if the result came from the cache layer.
        cache_hit: bool,
    },
    /// A gate selected a target.
    RoutingDecision {
        /// Run identifier.
        run_id: String,
        /// Nesting path.
        scope: String,
        /// The deciding gate.
        gate: String,
        /// Selected target ([`crate::graph::END`] terminates the run).
        target: String,
    },
    /// An interrupt surfaced and the run is suspending.
    InterruptRaised {
        /// Run identifier.
        run_id: String,
        /// Nesting path.
        scope: String,
        /// The interrupt node.
        node: String,
        /// The value surfaced to the caller.
        value: Value,
        /// Store key a resume response must be supplied under.
        response_key: String,
    },
    /// Cooperative stop was requested; in-flight nodes finish, nothing new
    /// starts.
    StopRequested {
        /// Run identifier.
        run_id: String,
        /// Nesting path.
        scope: String,
    },
}

impl GraphEvent {
    /// The node this event concerns, if any.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            GraphEvent::NodeStarted { node, .. }
            | GraphEvent::NodeFinished { node, .. }
            | GraphEvent::InterruptRaised { node, .. } => Some(node),
            GraphEvent::RoutingDecision { gate, .. } => Some(gate),
            _ => None,
        }
    }
}

/// Real-time consumer of [`GraphEvent`]s.
///
/// Observers are called inline from the scheduling loop; keep callbacks
/// cheap and non-blocking.
pub trait EventObserver: Send + Sync {
    /// Called once per event, in emission order.
    fn on_event(&self, event: &GraphEvent);
}

impl<T: EventObserver + ?Sized> EventObserver for Arc<T> {
    fn on_event(&self, event: &GraphEvent) {
        (**self).on_event(event);
    }
}

/// Observer that records every event, for tests and trace capture.
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<GraphEvent>>,
}

impl CollectingObserver {
    /// New empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.lock().clone()
    }

    /// Names of nodes that finished, in completion order.
    #[must_use]
    pub fn finished_nodes(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                GraphEvent::NodeFinished { node, .. } => Some(node.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventObserver for CollectingObserver {
    fn on_event(&self, event: &GraphEvent) {
        self.events.lock().push(event.clone());
    }
}
