//! Expression Nodes
//!
//! This module implements the declarative side of the runtime: immutable
//! operator trees over [`ValueCell`](crate::cell::ValueCell)s.
//!
//! # Concepts
//!
//! ## Expressions
//!
//! An [`Expr`] is a handle to an immutable node in an acyclic operator
//! graph. Nodes are pure functions of their dependencies' current values,
//! with two explicit side-effecting exceptions: `Assign` (writes a cell)
//! and `Call` (invokes an external function). Because those exist, order of
//! evaluation inside a `Block` is significant and preserved exactly as
//! authored.
//!
//! ## Builders
//!
//! Graphs are built with an explicit builder API: standard arithmetic
//! operators (`a + b`, `-a`), comparison and boolean methods
//! (`a.less_than(b)`, `a.and(b)`), and constructors for control flow
//! (`Expr::cond`, `Expr::block`, `Expr::set`, `Expr::call`,
//! `Expr::on_change`). Assignment is a node constructor, never an
//! overloaded operator, so no source rewriting step exists anywhere.
//!
//! ## Evaluation
//!
//! [`Expr::evaluate`] walks the tree recursively. `Cond` is truly lazy: the
//! untaken branch is never evaluated, so its side effects never fire.
//!
//! # Implementation Notes
//!
//! Node structure is fixed at construction; the only interior mutability is
//! the previous-value snapshot inside `OnChange`, which is bookkeeping for
//! change detection rather than graph shape.

mod helpers;
mod node;

pub use helpers::{interpolate, with_offset};
pub use node::{BinaryOp, CallFn, Expr, UnaryOp};
