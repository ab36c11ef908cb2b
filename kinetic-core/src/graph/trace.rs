//! Graph tracing hooks.
//!
//! An injectable observer for graph lifecycle and recomputation, used by the
//! host's debug tooling. The default tracer does nothing; `tracing` events
//! are emitted unconditionally at trace level either way.

use std::sync::Arc;

/// A single observable graph event.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// A root was attached with the given number of dependency cells.
    Attached { root: u64, dependencies: usize },
    /// A root was detached and its subscriptions removed.
    Detached { root: u64 },
    /// A root finished recomputation with the given result value.
    Recomputed { root: u64, value: f64 },
}

/// Observer invoked for every [`TraceEvent`].
pub type Tracer = Arc<dyn Fn(&TraceEvent) + Send + Sync>;

/// The default tracer: ignores every event.
pub fn noop_tracer() -> Tracer {
    Arc::new(|_| {})
}
