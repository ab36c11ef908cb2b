//! Kinetic Core
//!
//! This crate provides the core runtime for the Kinetic gesture animation
//! framework. It implements:
//!
//! - Observable numeric cells with synchronous change notification
//! - Immutable expression trees over those cells (arithmetic, comparison,
//!   control flow, assignment, external calls)
//! - A reactive graph that recomputes attached expressions when their
//!   dependencies change
//! - Event binding from external gesture/scroll streams into cells
//! - Timing and spring animation drivers fed by the host's frame clock
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `cell`: The observable mutable number, [`ValueCell`]
//! - `expr`: Expression nodes, builders, and the evaluator
//! - `graph`: Attachment, dependency subscription, and recomputation
//! - `event`: Field-path mapping from event samples to cells
//! - `driver`: Frame-clock-driven timing and spring animations
//!
//! # Example
//!
//! ```rust,ignore
//! use kinetic_core::{Expr, ExpressionGraph, ValueCell};
//! use kinetic_core::event::gesture_state;
//!
//! let graph = ExpressionGraph::new();
//!
//! let state = ValueCell::bridged(gesture_state::UNDETERMINED);
//! let pan_active = ValueCell::new(0.0);
//!
//! // pan_active mirrors whether the gesture is live.
//! let root = Expr::set(&pan_active, Expr::cell(&state).eq(gesture_state::ACTIVE));
//! let handle = graph.attach(&root)?;
//!
//! state.write(gesture_state::ACTIVE)?;
//! assert_eq!(pan_active.read(), 1.0);
//!
//! graph.detach(&handle);
//! ```

pub mod cell;
pub mod driver;
pub mod error;
pub mod event;
pub mod expr;
pub mod graph;

pub use cell::{ListenerHandle, ValueCell};
pub use driver::{AnimationDriver, DriverConfig, DriverHandle, DriverState, Easing, SpringConfig};
pub use error::{Error, Result};
pub use event::{EventBinder, EventHandler, FieldMap, Sample};
pub use expr::{interpolate, with_offset, Expr};
pub use graph::{ExpressionGraph, RootHandle, TraceEvent};
