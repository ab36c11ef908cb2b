//! Timing curve easing functions.
//!
//! A cubic bezier's x polynomial maps parameter to time; easing inverts it
//! with a binary search and evaluates the y polynomial at the result.

/// An easing curve mapping normalized progress to eased progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Easing {
    Linear,
    /// Cubic bezier with control points (x1, y1) and (x2, y2); the curve
    /// anchors are fixed at (0, 0) and (1, 1).
    Bezier { x1: f64, y1: f64, x2: f64, y2: f64 },
}

impl Easing {
    /// The standard ease-in-out curve.
    pub fn ease_in_out() -> Self {
        Self::Bezier {
            x1: 0.42,
            y1: 0.0,
            x2: 0.58,
            y2: 1.0,
        }
    }

    /// The standard ease-out curve.
    pub fn ease_out() -> Self {
        Self::Bezier {
            x1: 0.0,
            y1: 0.0,
            x2: 0.58,
            y2: 1.0,
        }
    }

    /// Map normalized progress `t` (clamped to [0, 1]) through the curve.
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::Bezier { x1, y1, x2, y2 } => {
                // The inversion requires a monotonic x polynomial, which
                // holds only for control x in [0, 1]; clamp like the CSS
                // timing-function grammar does.
                let x1 = x1.clamp(0.0, 1.0);
                let x2 = x2.clamp(0.0, 1.0);

                // Bezier(0,0,1,1) is exactly linear.
                if x1 == 0.0 && y1 == 0.0 && x2 == 1.0 && y2 == 1.0 {
                    return t;
                }

                // Invert x by binary search, then evaluate y at the found
                // parameter.
                let mut lo = 0.0f64;
                let mut hi = 1.0f64;
                let mut mid = t;
                for _ in 0..32 {
                    let x = cubic_bezier(x1, x2, mid);
                    if (x - t).abs() < 1e-9 {
                        break;
                    }
                    if x < t {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                    mid = 0.5 * (lo + hi);
                }
                cubic_bezier(y1, y2, mid)
            }
        }
    }
}

impl Default for Easing {
    fn default() -> Self {
        Easing::Linear
    }
}

/// Cubic bezier polynomial with anchors 0 and 1 and the given inner
/// control values.
fn cubic_bezier(p1: f64, p2: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
