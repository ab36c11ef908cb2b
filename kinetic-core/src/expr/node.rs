//! Expression node variants, builders, and the evaluator.
//!
//! # How Evaluation Works
//!
//! 1. `Constant` and `CellRef` are the leaves; a `CellRef` reads its cell's
//!    current value (failing if the cell was torn down).
//!
//! 2. Operators apply IEEE double semantics: division by zero yields
//!    infinity or NaN, never an error, and comparisons involving NaN are
//!    always false. Boolean results are encoded as 1.0 / 0.0.
//!
//! 3. `Assign` evaluates its value expression and commits the result through
//!    the normal `ValueCell::write` path, so the cell's listeners (including
//!    graph recomputation) run inline before the node yields its value.
//!
//! 4. `OnChange` keeps a per-node snapshot of the watched cell. The trigger
//!    runs only when the watched value differs from that snapshot; the very
//!    first evaluation records the snapshot without firing, matching attach
//!    semantics of the event-driven hosts this models.

use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use crate::cell::ValueCell;
use crate::error::Result;

/// External function invoked by a `Call` node.
///
/// Receives a snapshot of the argument cells' current values. This is the
/// graph's designated escape hatch for side effects outside the value model
/// (logging, imperative host calls). The return value becomes the node's
/// value; pure observers return `Ok(0.0)`.
pub type CallFn = Arc<dyn Fn(&[f64]) -> Result<f64> + Send + Sync>;

/// Binary operators.
///
/// Both operands are always evaluated; only `Cond` short-circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    LessThan,
    LessOrEq,
    GreaterThan,
    GreaterOrEq,
    And,
    Or,
}

/// Truthiness for condition tests and boolean operands: non-zero and not
/// NaN. NaN is falsy, matching the number model of the event hosts this
/// runtime serves.
fn truthy(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

impl BinaryOp {
    /// Apply the operator to two already-evaluated operands.
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        fn bool_to_num(b: bool) -> f64 {
            if b {
                1.0
            } else {
                0.0
            }
        }

        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            // NaN compares false for every comparison, == and != included.
            BinaryOp::Eq => bool_to_num(lhs == rhs),
            BinaryOp::Neq => bool_to_num(!lhs.is_nan() && !rhs.is_nan() && lhs != rhs),
            BinaryOp::LessThan => bool_to_num(lhs < rhs),
            BinaryOp::LessOrEq => bool_to_num(lhs <= rhs),
            BinaryOp::GreaterThan => bool_to_num(lhs > rhs),
            BinaryOp::GreaterOrEq => bool_to_num(lhs >= rhs),
            BinaryOp::And => bool_to_num(truthy(lhs) && truthy(rhs)),
            BinaryOp::Or => bool_to_num(truthy(lhs) || truthy(rhs)),
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Round,
}

impl UnaryOp {
    pub fn apply(self, operand: f64) -> f64 {
        match self {
            UnaryOp::Neg => -operand,
            UnaryOp::Round => operand.round(),
        }
    }
}

/// Internal node storage.
enum ExprKind {
    Constant(f64),
    CellRef(ValueCell),
    Unary {
        op: UnaryOp,
        operand: Expr,
    },
    Binary {
        op: BinaryOp,
        lhs: Expr,
        rhs: Expr,
    },
    Cond {
        test: Expr,
        consequent: Expr,
        alternate: Expr,
    },
    Block(Vec<Expr>),
    Assign {
        target: ValueCell,
        value: Expr,
    },
    Call {
        args: Vec<ValueCell>,
        f: CallFn,
    },
    OnChange {
        watched: ValueCell,
        trigger: Expr,
        /// Value observed on the previous evaluation of this node.
        prev: RwLock<Option<f64>>,
    },
}

/// An immutable node in the operator graph (cheap to clone; clones share
/// the node).
#[derive(Clone)]
pub struct Expr(Arc<ExprKind>);

impl Expr {
    fn from_kind(kind: ExprKind) -> Self {
        Self(Arc::new(kind))
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    /// A constant number.
    pub fn constant(value: f64) -> Self {
        Self::from_kind(ExprKind::Constant(value))
    }

    /// A reference to a cell's current value.
    pub fn cell(cell: &ValueCell) -> Self {
        Self::from_kind(ExprKind::CellRef(cell.clone()))
    }

    /// `consequent` if `test` evaluates truthy (non-zero, not NaN), else
    /// `alternate`.
    ///
    /// The untaken branch is never evaluated, so its `Assign`/`Call` side
    /// effects never fire.
    pub fn cond(
        test: impl Into<Expr>,
        consequent: impl Into<Expr>,
        alternate: impl Into<Expr>,
    ) -> Self {
        Self::from_kind(ExprKind::Cond {
            test: test.into(),
            consequent: consequent.into(),
            alternate: alternate.into(),
        })
    }

    /// Evaluate every statement in order; the block's value is the last
    /// statement's value. An empty block evaluates to 0.0.
    pub fn block(statements: impl IntoIterator<Item = Expr>) -> Self {
        Self::from_kind(ExprKind::Block(statements.into_iter().collect()))
    }

    /// Evaluate `value` and write the result into `target`, triggering the
    /// target's listeners inline. The node's value is the written value.
    pub fn set(target: &ValueCell, value: impl Into<Expr>) -> Self {
        Self::from_kind(ExprKind::Assign {
            target: target.clone(),
            value: value.into(),
        })
    }

    /// Invoke an external function with a snapshot of the argument cells'
    /// current values.
    pub fn call<F>(args: &[&ValueCell], f: F) -> Self
    where
        F: Fn(&[f64]) -> Result<f64> + Send + Sync + 'static,
    {
        Self::from_kind(ExprKind::Call {
            args: args.iter().map(|c| (*c).clone()).collect(),
            f: Arc::new(f),
        })
    }

    /// Run `trigger` only when `watched`'s value differs from the value
    /// observed on this node's previous evaluation.
    pub fn on_change(watched: &ValueCell, trigger: impl Into<Expr>) -> Self {
        Self::from_kind(ExprKind::OnChange {
            watched: watched.clone(),
            trigger: trigger.into(),
            prev: RwLock::new(None),
        })
    }

    fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::from_kind(ExprKind::Unary { op, operand })
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::from_kind(ExprKind::Binary { op, lhs, rhs })
    }

    // ------------------------------------------------------------------
    // Comparison / boolean builders
    // ------------------------------------------------------------------

    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::Eq, self, rhs.into())
    }

    pub fn neq(self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::Neq, self, rhs.into())
    }

    pub fn less_than(self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::LessThan, self, rhs.into())
    }

    pub fn less_or_eq(self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::LessOrEq, self, rhs.into())
    }

    pub fn greater_than(self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::GreaterThan, self, rhs.into())
    }

    pub fn greater_or_eq(self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::GreaterOrEq, self, rhs.into())
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::And, self, rhs.into())
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::Or, self, rhs.into())
    }

    /// Round to the nearest integer.
    pub fn round(self) -> Expr {
        Self::unary(UnaryOp::Round, self)
    }

    /// The smaller of the two values. Encoded as a cond, so operands are
    /// evaluated in both the test and the taken branch; use with pure
    /// value expressions.
    pub fn min(self, rhs: impl Into<Expr>) -> Expr {
        let rhs = rhs.into();
        Expr::cond(self.clone().less_than(rhs.clone()), self, rhs)
    }

    /// The larger of the two values.
    pub fn max(self, rhs: impl Into<Expr>) -> Expr {
        let rhs = rhs.into();
        Expr::cond(self.clone().greater_than(rhs.clone()), self, rhs)
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Evaluate the node, committing any `Assign`/`Call` side effects.
    pub fn evaluate(&self) -> Result<f64> {
        match &*self.0 {
            ExprKind::Constant(c) => Ok(*c),
            ExprKind::CellRef(cell) => cell.checked_read(),
            ExprKind::Unary { op, operand } => Ok(op.apply(operand.evaluate()?)),
            ExprKind::Binary { op, lhs, rhs } => {
                let l = lhs.evaluate()?;
                let r = rhs.evaluate()?;
                Ok(op.apply(l, r))
            }
            ExprKind::Cond {
                test,
                consequent,
                alternate,
            } => {
                if truthy(test.evaluate()?) {
                    consequent.evaluate()
                } else {
                    alternate.evaluate()
                }
            }
            ExprKind::Block(statements) => {
                let mut last = 0.0;
                for statement in statements {
                    last = statement.evaluate()?;
                }
                Ok(last)
            }
            ExprKind::Assign { target, value } => {
                let v = value.evaluate()?;
                target.write(v)?;
                Ok(v)
            }
            ExprKind::Call { args, f } => {
                let snapshot: Vec<f64> = args
                    .iter()
                    .map(|cell| cell.checked_read())
                    .collect::<Result<_>>()?;
                f(&snapshot)
            }
            ExprKind::OnChange {
                watched,
                trigger,
                prev,
            } => {
                let current = watched.checked_read()?;
                let previous = {
                    let guard = prev.read().expect("prev lock poisoned");
                    *guard
                };

                match previous {
                    None => {
                        // First evaluation establishes the snapshot.
                        *prev.write().expect("prev lock poisoned") = Some(current);
                        Ok(0.0)
                    }
                    Some(p) if p == current => Ok(0.0),
                    Some(_) => {
                        *prev.write().expect("prev lock poisoned") = Some(current);
                        trigger.evaluate()
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Dependency inspection (used by the graph at attach time)
    // ------------------------------------------------------------------

    /// Visit every cell this node reads: reachable `CellRef`s, `OnChange`
    /// watched cells, and `Call` argument cells.
    pub(crate) fn visit_reads(&self, visit: &mut dyn FnMut(&ValueCell)) {
        match &*self.0 {
            ExprKind::Constant(_) => {}
            ExprKind::CellRef(cell) => visit(cell),
            ExprKind::Unary { operand, .. } => operand.visit_reads(visit),
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.visit_reads(visit);
                rhs.visit_reads(visit);
            }
            ExprKind::Cond {
                test,
                consequent,
                alternate,
            } => {
                test.visit_reads(visit);
                consequent.visit_reads(visit);
                alternate.visit_reads(visit);
            }
            ExprKind::Block(statements) => {
                for statement in statements {
                    statement.visit_reads(visit);
                }
            }
            ExprKind::Assign { value, .. } => value.visit_reads(visit),
            ExprKind::Call { args, .. } => {
                for cell in args {
                    visit(cell);
                }
            }
            ExprKind::OnChange {
                watched, trigger, ..
            } => {
                visit(watched);
                trigger.visit_reads(visit);
            }
        }
    }

    /// Visit every cell this node may write (`Assign` targets anywhere in
    /// the subtree).
    pub(crate) fn visit_writes(&self, visit: &mut dyn FnMut(&ValueCell)) {
        match &*self.0 {
            ExprKind::Constant(_) | ExprKind::CellRef(_) | ExprKind::Call { .. } => {}
            ExprKind::Unary { operand, .. } => operand.visit_writes(visit),
            ExprKind::Binary { lhs, rhs, .. } => {
                lhs.visit_writes(visit);
                rhs.visit_writes(visit);
            }
            ExprKind::Cond {
                test,
                consequent,
                alternate,
            } => {
                test.visit_writes(visit);
                consequent.visit_writes(visit);
                alternate.visit_writes(visit);
            }
            ExprKind::Block(statements) => {
                for statement in statements {
                    statement.visit_writes(visit);
                }
            }
            ExprKind::Assign { target, value } => {
                visit(target);
                value.visit_writes(visit);
            }
            ExprKind::OnChange { trigger, .. } => trigger.visit_writes(visit),
        }
    }
}

impl Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match &*self.0 {
            ExprKind::Constant(c) => return write!(f, "Constant({c})"),
            ExprKind::CellRef(cell) => return write!(f, "CellRef({})", cell.id()),
            ExprKind::Unary { op, .. } => return write!(f, "Unary({op:?})"),
            ExprKind::Binary { op, .. } => return write!(f, "Binary({op:?})"),
            ExprKind::Cond { .. } => "Cond",
            ExprKind::Block(_) => "Block",
            ExprKind::Assign { .. } => "Assign",
            ExprKind::Call { .. } => "Call",
            ExprKind::OnChange { .. } => "OnChange",
        };
        f.write_str(name)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::constant(value)
    }
}

impl From<&ValueCell> for Expr {
    fn from(cell: &ValueCell) -> Self {
        Expr::cell(cell)
    }
}

impl From<ValueCell> for Expr {
    fn from(cell: ValueCell) -> Self {
        Expr::cell(&cell)
    }
}

impl<T: Into<Expr>> std::ops::Add<T> for Expr {
    type Output = Expr;
    fn add(self, rhs: T) -> Expr {
        Expr::binary(BinaryOp::Add, self, rhs.into())
    }
}

impl<T: Into<Expr>> std::ops::Sub<T> for Expr {
    type Output = Expr;
    fn sub(self, rhs: T) -> Expr {
        Expr::binary(BinaryOp::Sub, self, rhs.into())
    }
}

impl<T: Into<Expr>> std::ops::Mul<T> for Expr {
    type Output = Expr;
    fn mul(self, rhs: T) -> Expr {
        Expr::binary(BinaryOp::Mul, self, rhs.into())
    }
}

impl<T: Into<Expr>> std::ops::Div<T> for Expr {
    type Output = Expr;
    fn div(self, rhs: T) -> Expr {
        Expr::binary(BinaryOp::Div, self, rhs.into())
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
