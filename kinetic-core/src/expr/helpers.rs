//! Expression combinators shared by the demo screens.
//!
//! These build ordinary [`Expr`] trees; nothing here extends the node set.

use crate::cell::ValueCell;
use crate::event::gesture_state;
use crate::expr::Expr;

fn interpolate_segment(value: &Expr, input: &[f64], output: &[f64], offset: usize) -> Expr {
    let in_s = input[offset];
    let in_e = input[offset + 1];
    let out_s = output[offset];
    let out_e = output[offset + 1];

    let progress = (value.clone() - in_s) / (in_e - in_s);
    Expr::constant(out_s) + progress * (out_e - out_s)
}

fn interpolate_from(value: &Expr, input: &[f64], output: &[f64], offset: usize) -> Expr {
    if input.len() - offset == 2 {
        return interpolate_segment(value, input, output, offset);
    }
    Expr::cond(
        value.clone().less_than(input[offset + 1]),
        interpolate_segment(value, input, output, offset),
        interpolate_from(value, input, output, offset + 1),
    )
}

/// Piecewise-linear mapping of `value` from `input_range` onto
/// `output_range`, as a cond-chain over the segments.
///
/// Extrapolates linearly beyond the outermost segments.
///
/// # Panics
///
/// Panics if the ranges differ in length or have fewer than two stops.
pub fn interpolate(value: impl Into<Expr>, input_range: &[f64], output_range: &[f64]) -> Expr {
    assert_eq!(
        input_range.len(),
        output_range.len(),
        "interpolate ranges must have equal length"
    );
    assert!(
        input_range.len() >= 2,
        "interpolate ranges need at least two stops"
    );

    interpolate_from(&value.into(), input_range, output_range, 0)
}

/// Gesture translation with an accumulated offset.
///
/// While the gesture is live this yields `offset + value`; when `state`
/// reaches END the running total is folded into `offset` so the next
/// gesture starts from where the last one left off.
pub fn with_offset(state: &ValueCell, value: &ValueCell, offset: &ValueCell) -> Expr {
    Expr::cond(
        Expr::cell(state).eq(gesture_state::END),
        Expr::block([
            Expr::set(offset, Expr::cell(offset) + Expr::cell(value)),
            Expr::cell(offset),
        ]),
        Expr::cell(offset) + Expr::cell(value),
    )
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
