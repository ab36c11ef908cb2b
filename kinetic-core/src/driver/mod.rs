//! Animation Drivers
//!
//! This module implements time-based writes into cells: timing curves and
//! spring physics that feed the expression graph one frame at a time.
//!
//! # How Driving Works
//!
//! 1. [`AnimationDriver::start`] registers an animation targeting one cell.
//!    At most one animation runs per cell; starting another supersedes the
//!    previous one without firing its completion callback.
//!
//! 2. The host's frame clock calls [`AnimationDriver::tick`] with the
//!    elapsed interval. Every intermediate value is committed through
//!    [`ValueCell::write`], so attached roots recompute on each frame
//!    exactly as they do for gesture input.
//!
//! 3. When a timing animation reaches its duration, or a spring settles,
//!    the driver writes exactly `to_value` as the final frame and fires the
//!    completion callback once. Cancellation halts writes immediately and
//!    fires nothing; the cell keeps whatever value the last frame wrote.

mod easing;
mod spring;

pub use easing::Easing;
pub use spring::{SpringConfig, SpringSim};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;

use crate::cell::ValueCell;
use crate::error::Result;

/// Counter for generating unique animation IDs.
static ANIMATION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The shape of an animation's value over time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    /// Fixed-duration curve; `duration` is in seconds.
    Timing { duration: f64, easing: Easing },
    /// Physics-driven; runs until the spring settles.
    Spring(SpringConfig),
}

/// What to animate towards and how.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverConfig {
    pub to_value: f64,
    pub curve: Curve,
}

impl DriverConfig {
    /// A timing animation to `to_value`.
    pub fn timing(to_value: f64, duration: f64, easing: Easing) -> Self {
        Self {
            to_value,
            curve: Curve::Timing { duration, easing },
        }
    }

    /// A spring animation to `to_value`.
    pub fn spring(to_value: f64, config: SpringConfig) -> Self {
        Self {
            to_value,
            curve: Curve::Spring(config),
        }
    }
}

/// Whether a cell currently has a running animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
}

/// Completion callback; fires exactly once, only on natural completion.
pub type OnComplete = Arc<dyn Fn() + Send + Sync>;

/// Handle controlling one started animation.
///
/// Cancelling a handle whose animation already finished or was superseded
/// is a no-op.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    cell_id: u64,
    animation_id: u64,
    active: Weak<RwLock<IndexMap<u64, Animation>>>,
}

impl DriverHandle {
    /// Stop this animation without completing it.
    ///
    /// The cell keeps the value of the last written frame; no completion
    /// callback fires. No-op if the animation already finished, was
    /// superseded, or the driver is gone.
    pub fn cancel(&self) {
        let Some(active) = self.active.upgrade() else {
            return;
        };
        let mut active = active.write().expect("active lock poisoned");
        if let Some(animation) = active.get(&self.cell_id) {
            if animation.id == self.animation_id {
                active.shift_remove(&self.cell_id);
                tracing::debug!(cell = self.cell_id, "animation cancelled");
            }
        }
    }
}

enum Progress {
    Timing {
        from: f64,
        duration: f64,
        easing: Easing,
        elapsed: f64,
    },
    Spring(SpringSim),
}

struct Animation {
    id: u64,
    cell: ValueCell,
    to_value: f64,
    progress: Progress,
    on_complete: Option<OnComplete>,
}

impl Animation {
    /// Advance by `dt`; returns the value to write and whether the
    /// animation finished on this frame.
    fn advance(&mut self, dt: f64) -> (f64, bool) {
        match &mut self.progress {
            Progress::Timing {
                from,
                duration,
                easing,
                elapsed,
            } => {
                *elapsed += dt;
                if *elapsed >= *duration {
                    // Final frame writes the destination exactly.
                    (self.to_value, true)
                } else {
                    let t = easing.apply(*elapsed / *duration);
                    (*from + (self.to_value - *from) * t, false)
                }
            }
            Progress::Spring(sim) => {
                sim.step(dt);
                if sim.is_settled() {
                    (self.to_value, true)
                } else {
                    (sim.value(), false)
                }
            }
        }
    }
}

/// Drives per-cell animations from the host's frame clock.
///
/// # Example
///
/// ```rust,ignore
/// let driver = AnimationDriver::new();
/// let progress = ValueCell::new(0.0);
///
/// driver.start(
///     &progress,
///     DriverConfig::timing(50.0, 0.3, Easing::ease_in_out()),
///     || tracing::debug!("refresh ready"),
/// );
///
/// // Host frame loop:
/// driver.tick(1.0 / 60.0)?;
/// ```
pub struct AnimationDriver {
    /// Active animations keyed by target cell ID.
    active: Arc<RwLock<IndexMap<u64, Animation>>>,
}

impl AnimationDriver {
    pub fn new() -> Self {
        Self {
            active: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    /// Start animating `cell` towards `config.to_value`.
    ///
    /// Supersedes any animation already running on the cell; the superseded
    /// animation fires no completion callback.
    pub fn start<F>(&self, cell: &ValueCell, config: DriverConfig, on_complete: F) -> DriverHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let from = cell.read();
        let progress = match config.curve {
            Curve::Timing { duration, easing } => Progress::Timing {
                from,
                duration,
                easing,
                elapsed: 0.0,
            },
            Curve::Spring(spring) => Progress::Spring(SpringSim::new(spring, from, config.to_value)),
        };

        let id = ANIMATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let animation = Animation {
            id,
            cell: cell.clone(),
            to_value: config.to_value,
            progress,
            on_complete: Some(Arc::new(on_complete)),
        };

        let superseded = self
            .active
            .write()
            .expect("active lock poisoned")
            .insert(cell.id(), animation);
        if let Some(old) = superseded {
            tracing::debug!(cell = cell.id(), superseded = old.id, "animation superseded");
        }
        tracing::debug!(cell = cell.id(), animation = id, to = config.to_value, "animation started");

        DriverHandle {
            cell_id: cell.id(),
            animation_id: id,
            active: Arc::downgrade(&self.active),
        }
    }

    /// Whether the handle's animation is still running.
    pub fn state(&self, handle: &DriverHandle) -> DriverState {
        let active = self.active.read().expect("active lock poisoned");
        match active.get(&handle.cell_id) {
            Some(animation) if animation.id == handle.animation_id => DriverState::Running,
            _ => DriverState::Idle,
        }
    }

    /// Number of animations currently running.
    pub fn active_count(&self) -> usize {
        self.active.read().expect("active lock poisoned").len()
    }

    /// Advance every running animation by `dt` seconds.
    ///
    /// Frame values are written through the normal cell path, so graph
    /// recomputation happens inline. Finished animations write their exact
    /// destination and fire completion once. A write error removes the
    /// failed animation and propagates; other animations keep their state
    /// for the next tick.
    pub fn tick(&self, dt: f64) -> Result<()> {
        // Step everything while holding the lock, but perform cell writes
        // and completion callbacks outside it: listeners may start or
        // cancel animations re-entrantly.
        let mut frames: Vec<(ValueCell, f64, Option<OnComplete>)> = Vec::new();
        {
            let mut active = self.active.write().expect("active lock poisoned");
            let mut finished: Vec<u64> = Vec::new();

            for (cell_id, animation) in active.iter_mut() {
                let (value, done) = animation.advance(dt);
                let on_complete = if done {
                    finished.push(*cell_id);
                    animation.on_complete.take()
                } else {
                    None
                };
                frames.push((animation.cell.clone(), value, on_complete));
            }

            for cell_id in finished {
                active.shift_remove(&cell_id);
            }
        }

        for (cell, value, on_complete) in frames {
            if let Err(e) = cell.write(value) {
                self.active
                    .write()
                    .expect("active lock poisoned")
                    .shift_remove(&cell.id());
                return Err(e);
            }
            if let Some(on_complete) = on_complete {
                tracing::debug!(cell = cell.id(), value, "animation completed");
                on_complete();
            }
        }
        Ok(())
    }
}

impl Default for AnimationDriver {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
