//! Error Types
//!
//! All fallible operations in the crate return [`Error`]. The variants map
//! directly onto the failure classes of the runtime:
//!
//! - Structural failures surface at attach time (`CycleDetected`,
//!   `CellDestroyed`), before any subscription is installed.
//! - Evaluation failures surface through the `write` call that triggered the
//!   recomputation. Side effects that already committed are not rolled back;
//!   there are no transactional semantics.
//! - Teardown races (`detach` after destroy, double-`unsubscribe`) are
//!   deliberately *not* errors. Those paths are idempotent no-ops.

use thiserror::Error;

/// The error type for expression-graph operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The attached roots form a feedback cycle through their assignment
    /// targets, or synchronous propagation exceeded the depth bound.
    #[error("expression graph contains a cycle involving root {0}")]
    CycleDetected(u64),

    /// A node referenced a cell that has already been torn down.
    #[error("cell {0} used after teardown")]
    CellDestroyed(u64),

    /// An event sample did not contain a numeric value at a mapped path.
    #[error("event field `{0}` missing from sample")]
    MissingField(String),

    /// An external function invoked by a `Call` node failed.
    #[error("external call failed: {0}")]
    External(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an arbitrary error from an external `Call` function.
    pub fn external<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::External(Box::new(source))
    }

    /// Wrap a plain message from an external `Call` function.
    pub fn external_msg(message: impl Into<String>) -> Self {
        Error::External(message.into().into())
    }
}
