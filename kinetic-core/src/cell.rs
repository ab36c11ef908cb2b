//! ValueCell Implementation
//!
//! A ValueCell is the fundamental observable primitive: a single mutable
//! number with an ordered list of change listeners.
//!
//! # How Cells Work
//!
//! 1. A cell always holds a defined value; there is no "unset" state.
//!
//! 2. `write` stores the new value and then notifies every listener
//!    synchronously, in registration order, before returning.
//!
//! 3. Listeners may themselves write other cells (graph recomputation does
//!    exactly that). Notification iterates over a snapshot of the listener
//!    list, so re-entrant writes and subscriptions during notification are
//!    safe.
//!
//! # Thread Safety
//!
//! Cells are designed to be thread-safe. The value is protected by a RwLock
//! and listener management uses the same lock discipline as the rest of the
//! crate. Cloning a cell is cheap and shares state.
//!
//! # Teardown
//!
//! When the owning component unmounts it calls [`ValueCell::destroy`]. A
//! destroyed cell rejects reads from the evaluator and writes with a
//! "use after teardown" error; unsubscribing from it stays a no-op so that
//! detach paths never fail during teardown.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Counter for generating unique cell IDs.
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique cell ID.
fn next_cell_id() -> u64 {
    CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Counter for generating unique listener IDs.
static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a registered listener.
///
/// Returned (inside a [`ListenerHandle`]) by [`ValueCell::subscribe`] and
/// used to remove the listener later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A change listener.
///
/// Listeners return `Result` so that errors raised while reacting to a write
/// (for example a failing `Call` node during graph recomputation) propagate
/// to the caller of the triggering `write`.
pub type Listener = Arc<dyn Fn(f64) -> Result<()> + Send + Sync>;

/// Handle identifying a subscription on a specific cell.
///
/// Pass it back to [`ValueCell::unsubscribe`]; unsubscribing twice is a
/// no-op.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    cell_id: u64,
    listener_id: ListenerId,
}

impl ListenerHandle {
    /// The listener's unique ID.
    pub fn listener_id(&self) -> ListenerId {
        self.listener_id
    }
}

/// An observable mutable numeric storage location.
///
/// # Example
///
/// ```rust,ignore
/// let pan_y = ValueCell::new(0.0);
///
/// let handle = pan_y.subscribe(|v| {
///     println!("panY moved to {v}");
///     Ok(())
/// });
///
/// pan_y.write(24.0)?;   // listener fires before write returns
/// pan_y.unsubscribe(&handle);
/// ```
pub struct ValueCell {
    /// Unique identifier for this cell.
    id: u64,

    /// The current value, protected by RwLock for thread safety.
    value: Arc<RwLock<f64>>,

    /// Registered listeners, in registration order.
    listeners: Arc<RwLock<SmallVec<[(ListenerId, Listener); 4]>>>,

    /// Whether the cell is promoted to a bridged execution context by the
    /// host. Carried metadata only; the evaluator treats bridged and plain
    /// cells identically.
    bridged: bool,

    /// Whether the owning component has torn this cell down.
    destroyed: Arc<AtomicBool>,
}

impl ValueCell {
    /// Create a new cell with the given initial value.
    pub fn new(value: f64) -> Self {
        Self {
            id: next_cell_id(),
            value: Arc::new(RwLock::new(value)),
            listeners: Arc::new(RwLock::new(SmallVec::new())),
            bridged: false,
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a new bridged cell.
    ///
    /// Bridged cells are fed by a differently-scheduled host context (the
    /// gesture recognizer, the frame clock). The flag is set at construction
    /// and never inferred from call order.
    pub fn bridged(value: f64) -> Self {
        Self {
            bridged: true,
            ..Self::new(value)
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this cell was constructed as bridged.
    pub fn is_bridged(&self) -> bool {
        self.bridged
    }

    /// Get the current value.
    ///
    /// Never blocks, never fails; the rendering layer calls this once per
    /// frame. Reads on a destroyed cell go through [`ValueCell::checked_read`]
    /// in the evaluator instead.
    pub fn read(&self) -> f64 {
        *self.value.read().expect("value lock poisoned")
    }

    /// Get the current value, failing if the cell has been torn down.
    ///
    /// Used by the evaluator so that a `CellRef` to a destroyed cell fails
    /// loudly instead of returning a stale value.
    pub fn checked_read(&self) -> Result<f64> {
        if self.is_destroyed() {
            return Err(Error::CellDestroyed(self.id));
        }
        Ok(self.read())
    }

    /// Set a new value and synchronously notify all listeners.
    ///
    /// Listeners run in registration order, before `write` returns. The
    /// first listener error aborts the remaining notifications and
    /// propagates to the caller; the value itself has already been stored.
    pub fn write(&self, value: f64) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::CellDestroyed(self.id));
        }

        {
            let mut guard = self.value.write().expect("value lock poisoned");
            *guard = value;
        }

        // Snapshot the listener list so re-entrant writes and subscription
        // changes during notification cannot invalidate the iteration.
        let snapshot: SmallVec<[(ListenerId, Listener); 4]> = self
            .listeners
            .read()
            .expect("listeners lock poisoned")
            .clone();

        for (_, listener) in snapshot.iter() {
            listener(value)?;
        }

        Ok(())
    }

    /// Register a listener; returns a handle usable for `unsubscribe`.
    pub fn subscribe<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(f64) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_arc(Arc::new(listener))
    }

    /// Register an already-shared listener.
    ///
    /// The graph uses this to install one recomputation callback on every
    /// dependency cell without boxing it once per cell.
    pub fn subscribe_arc(&self, listener: Listener) -> ListenerHandle {
        let id = ListenerId::new();
        self.listeners
            .write()
            .expect("listeners lock poisoned")
            .push((id, listener));

        ListenerHandle {
            cell_id: self.id,
            listener_id: id,
        }
    }

    /// Remove a listener. No-op if already removed or if the handle belongs
    /// to a different cell.
    pub fn unsubscribe(&self, handle: &ListenerHandle) {
        if handle.cell_id != self.id {
            return;
        }
        self.listeners
            .write()
            .expect("listeners lock poisoned")
            .retain(|(id, _)| *id != handle.listener_id);
    }

    /// Tear the cell down: clears all listeners and rejects further
    /// evaluator reads and writes.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.listeners
            .write()
            .expect("listeners lock poisoned")
            .clear();
    }

    /// Check whether the cell has been torn down.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Get the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().expect("listeners lock poisoned").len()
    }
}

impl Clone for ValueCell {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            listeners: Arc::clone(&self.listeners),
            bridged: self.bridged,
            destroyed: Arc::clone(&self.destroyed),
        }
    }
}

impl Debug for ValueCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCell")
            .field("id", &self.id)
            .field("value", &self.read())
            .field("bridged", &self.bridged)
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn cell_read_and_write() {
        let cell = ValueCell::new(0.0);
        assert_eq!(cell.read(), 0.0);

        cell.write(42.0).unwrap();
        assert_eq!(cell.read(), 42.0);
    }

    #[test]
    fn cell_ids_are_unique() {
        let a = ValueCell::new(0.0);
        let b = ValueCell::new(0.0);
        let c = ValueCell::new(0.0);

        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let cell = ValueCell::new(0.0);
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in 1..=3 {
            let order = order.clone();
            cell.subscribe(move |_| {
                order.lock().unwrap().push(label);
                Ok(())
            });
        }

        cell.write(1.0).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn listener_observes_new_value() {
        let cell = ValueCell::new(0.0);
        let observed = Arc::new(Mutex::new(f64::NAN));
        let observed_clone = observed.clone();

        cell.subscribe(move |v| {
            *observed_clone.lock().unwrap() = v;
            Ok(())
        });

        cell.write(12.5).unwrap();
        assert_eq!(*observed.lock().unwrap(), 12.5);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let cell = ValueCell::new(0.0);
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();

        let handle = cell.subscribe(move |_| {
            *count_clone.lock().unwrap() += 1;
            Ok(())
        });

        cell.write(1.0).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);

        cell.unsubscribe(&handle);
        cell.unsubscribe(&handle);

        cell.write(2.0).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn listener_error_propagates_and_stops_notification() {
        let cell = ValueCell::new(0.0);
        let later_ran = Arc::new(Mutex::new(false));

        cell.subscribe(|_| Err(Error::external_msg("boom")));
        let later_clone = later_ran.clone();
        cell.subscribe(move |_| {
            *later_clone.lock().unwrap() = true;
            Ok(())
        });

        let result = cell.write(1.0);
        assert!(result.is_err());

        // The value committed before notification failed.
        assert_eq!(cell.read(), 1.0);
        assert!(!*later_ran.lock().unwrap());
    }

    #[test]
    fn reentrant_write_to_other_cell_completes_first() {
        let a = ValueCell::new(0.0);
        let b = ValueCell::new(0.0);
        let b_seen = Arc::new(Mutex::new(f64::NAN));

        let b_seen_clone = b_seen.clone();
        b.subscribe(move |v| {
            *b_seen_clone.lock().unwrap() = v;
            Ok(())
        });

        let b_clone = b.clone();
        a.subscribe(move |v| b_clone.write(v * 2.0));

        a.write(5.0).unwrap();

        // b's listener must have observed the propagated value by the time
        // the originating write returned.
        assert_eq!(*b_seen.lock().unwrap(), 10.0);
        assert_eq!(b.read(), 10.0);
    }

    #[test]
    fn destroyed_cell_rejects_checked_access() {
        let cell = ValueCell::new(3.0);
        cell.subscribe(|_| Ok(()));
        assert_eq!(cell.listener_count(), 1);

        cell.destroy();
        assert!(cell.is_destroyed());
        assert_eq!(cell.listener_count(), 0);

        assert!(matches!(cell.checked_read(), Err(Error::CellDestroyed(_))));
        assert!(matches!(cell.write(1.0), Err(Error::CellDestroyed(_))));
    }

    #[test]
    fn clone_shares_state() {
        let a = ValueCell::new(0.0);
        let b = a.clone();

        a.write(7.0).unwrap();
        assert_eq!(b.read(), 7.0);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn bridged_flag_is_set_at_construction() {
        assert!(!ValueCell::new(0.0).is_bridged());
        assert!(ValueCell::bridged(0.0).is_bridged());
    }
}
