//! Expression Graph
//!
//! This module implements the reactive half of the runtime: attaching
//! expression roots to their dependency cells and recomputing them when
//! those cells change.
//!
//! # How Attachment Works
//!
//! 1. At attach time the root's tree is walked once to collect its
//!    dependency set (every cell it reads) and its write set (every cell an
//!    `Assign` in the tree may target).
//!
//! 2. One shared recomputation listener is subscribed on each dependency
//!    cell. Any write to any dependency re-evaluates the entire root; there
//!    is no per-node memoization or dirty marking.
//!
//! 3. The root is evaluated once immediately, so `OnChange` nodes record
//!    their first snapshot and `Assign` targets hold consistent values
//!    before the first external write arrives.
//!
//! # Cycles and Self-Writes
//!
//! A root is allowed to write a cell it also reads; the accumulate-on-end
//! gesture pattern depends on it. While a root is evaluating, notifications
//! it causes on its own dependencies are skipped rather than re-entered.
//!
//! Cycles *between* roots (A writes what B reads, B writes what A reads)
//! are rejected at attach time. A propagation depth bound backstops
//! anything the static check cannot see, such as cycles routed through
//! host listeners.

mod trace;

pub use trace::{noop_tracer, TraceEvent, Tracer};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::cell::{Listener, ListenerHandle, ValueCell};
use crate::error::{Error, Result};
use crate::expr::Expr;

/// Counter for generating unique root IDs.
static ROOT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Maximum depth of nested recomputations triggered by a single external
/// write. Exceeding it means a feedback loop the attach-time check could
/// not see.
const MAX_PROPAGATION_DEPTH: usize = 64;

/// Handle identifying an attached root.
///
/// Pass it back to [`ExpressionGraph::detach`]; detaching twice is a no-op.
#[derive(Debug, Clone)]
pub struct RootHandle {
    root_id: u64,
}

impl RootHandle {
    /// The root's unique ID.
    pub fn root_id(&self) -> u64 {
        self.root_id
    }
}

/// Shared state between a root's registry entry and its recomputation
/// listener.
struct RootInner {
    id: u64,
    expr: Expr,
    /// Set while this root is evaluating; self-notifications are skipped.
    in_progress: AtomicBool,
    /// Set at detach so a listener still held by a cell becomes inert.
    detached: AtomicBool,
}

/// Registry entry for one attached root.
struct AttachedRoot {
    inner: Arc<RootInner>,
    /// Dependency subscriptions, removed at detach.
    subscriptions: Vec<(ValueCell, ListenerHandle)>,
    /// Cell IDs this root reads.
    reads: HashSet<u64>,
    /// Cell IDs this root may write.
    writes: HashSet<u64>,
}

/// The reactive evaluator: owns attached roots and drives their
/// recomputation.
///
/// # Example
///
/// ```rust,ignore
/// let graph = ExpressionGraph::new();
/// let gesture_state = ValueCell::new(0.0);
/// let pan_active = ValueCell::new(0.0);
///
/// let root = Expr::set(
///     &pan_active,
///     Expr::cell(&gesture_state).eq(gesture_state::ACTIVE),
/// );
/// let handle = graph.attach(&root)?;
///
/// gesture_state.write(gesture_state::ACTIVE)?; // pan_active becomes 1.0
/// graph.detach(&handle);
/// ```
pub struct ExpressionGraph {
    roots: Arc<RwLock<IndexMap<u64, AttachedRoot>>>,
    /// Current nesting depth of recomputations across all roots.
    depth: Arc<AtomicUsize>,
    tracer: Tracer,
}

impl ExpressionGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::with_tracer(noop_tracer())
    }

    /// Create a graph that reports lifecycle and recomputation events to
    /// the given tracer.
    pub fn with_tracer(tracer: Tracer) -> Self {
        Self {
            roots: Arc::new(RwLock::new(IndexMap::new())),
            depth: Arc::new(AtomicUsize::new(0)),
            tracer,
        }
    }

    /// Number of currently attached roots.
    pub fn root_count(&self) -> usize {
        self.roots.read().expect("roots lock poisoned").len()
    }

    /// Attach `root`: subscribe to its dependency cells, evaluate it once,
    /// and keep it live until [`ExpressionGraph::detach`].
    ///
    /// Fails if any dependency cell has been torn down, or if the root's
    /// write set would close a cycle with roots already attached.
    pub fn attach(&self, root: &Expr) -> Result<RootHandle> {
        let root_id = ROOT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

        // Dependency walk. IndexMap deduplicates while keeping first-seen
        // order, so subscription order is deterministic.
        let mut deps: IndexMap<u64, ValueCell> = IndexMap::new();
        root.visit_reads(&mut |cell| {
            deps.entry(cell.id()).or_insert_with(|| cell.clone());
        });

        // Writes are validated alongside reads: a torn-down Assign target
        // is a structural error even when it hides in an untaken branch.
        let mut writes: HashSet<u64> = HashSet::new();
        let mut destroyed_write: Option<u64> = None;
        root.visit_writes(&mut |cell| {
            if cell.is_destroyed() {
                destroyed_write.get_or_insert(cell.id());
            }
            writes.insert(cell.id());
        });
        if let Some(id) = destroyed_write {
            return Err(Error::CellDestroyed(id));
        }

        for cell in deps.values() {
            if cell.is_destroyed() {
                return Err(Error::CellDestroyed(cell.id()));
            }
        }

        let reads: HashSet<u64> = deps.keys().copied().collect();
        self.check_for_cycle(root_id, &reads, &writes)?;

        let inner = Arc::new(RootInner {
            id: root_id,
            expr: root.clone(),
            in_progress: AtomicBool::new(false),
            detached: AtomicBool::new(false),
        });

        // One shared listener across all dependency cells.
        let listener: Listener = {
            let inner = Arc::clone(&inner);
            let depth = Arc::clone(&self.depth);
            let tracer = Arc::clone(&self.tracer);
            Arc::new(move |_| Self::recompute(&inner, &depth, &tracer))
        };

        let subscriptions: Vec<(ValueCell, ListenerHandle)> = deps
            .into_values()
            .map(|cell| {
                let handle = cell.subscribe_arc(Arc::clone(&listener));
                (cell, handle)
            })
            .collect();

        let dependency_count = subscriptions.len();
        self.roots.write().expect("roots lock poisoned").insert(
            root_id,
            AttachedRoot {
                inner: Arc::clone(&inner),
                subscriptions,
                reads,
                writes,
            },
        );

        // Lifecycle begins before the first result is reported.
        tracing::debug!(root = root_id, dependencies = dependency_count, "root attached");
        (self.tracer)(&TraceEvent::Attached {
            root: root_id,
            dependencies: dependency_count,
        });

        // Initial evaluation, under the same guards as any recomputation.
        if let Err(e) = Self::recompute(&inner, &self.depth, &self.tracer) {
            self.detach(&RootHandle { root_id });
            return Err(e);
        }

        Ok(RootHandle { root_id })
    }

    /// Detach a root: remove its dependency subscriptions and drop it from
    /// the registry. No-op if already detached.
    pub fn detach(&self, handle: &RootHandle) {
        let removed = self
            .roots
            .write()
            .expect("roots lock poisoned")
            .shift_remove(&handle.root_id);

        let Some(root) = removed else {
            return;
        };

        root.inner.detached.store(true, Ordering::SeqCst);
        for (cell, subscription) in &root.subscriptions {
            cell.unsubscribe(subscription);
        }

        tracing::debug!(root = handle.root_id, "root detached");
        (self.tracer)(&TraceEvent::Detached {
            root: handle.root_id,
        });
    }

    /// Evaluate one root, guarded against self-notification and runaway
    /// propagation.
    fn recompute(inner: &Arc<RootInner>, depth: &AtomicUsize, tracer: &Tracer) -> Result<()> {
        if inner.detached.load(Ordering::SeqCst) {
            return Ok(());
        }
        if inner.in_progress.swap(true, Ordering::SeqCst) {
            // This root caused the write that is notifying it; skip.
            return Ok(());
        }

        let result = if depth.fetch_add(1, Ordering::SeqCst) >= MAX_PROPAGATION_DEPTH {
            Err(Error::CycleDetected(inner.id))
        } else {
            inner.expr.evaluate()
        };
        depth.fetch_sub(1, Ordering::SeqCst);
        inner.in_progress.store(false, Ordering::SeqCst);

        let value = result?;
        tracing::trace!(root = inner.id, value, "root recomputed");
        tracer(&TraceEvent::Recomputed {
            root: inner.id,
            value,
        });
        Ok(())
    }

    /// Reject attachment if the candidate root would close a write/read
    /// cycle with already-attached roots.
    ///
    /// Edges run from a writer to every root that reads one of its written
    /// cells. A root writing its own dependencies is not an edge; that case
    /// is handled at runtime by the in-progress guard.
    fn check_for_cycle(
        &self,
        candidate_id: u64,
        candidate_reads: &HashSet<u64>,
        candidate_writes: &HashSet<u64>,
    ) -> Result<()> {
        let roots = self.roots.read().expect("roots lock poisoned");

        let mut reads: HashMap<u64, &HashSet<u64>> = HashMap::new();
        let mut writes: HashMap<u64, &HashSet<u64>> = HashMap::new();
        for (id, root) in roots.iter() {
            reads.insert(*id, &root.reads);
            writes.insert(*id, &root.writes);
        }
        reads.insert(candidate_id, candidate_reads);
        writes.insert(candidate_id, candidate_writes);

        let edges_from = |from: u64| -> Vec<u64> {
            let from_writes = writes[&from];
            reads
                .iter()
                .filter(|(to, to_reads)| {
                    **to != from && from_writes.iter().any(|w| to_reads.contains(w))
                })
                .map(|(to, _)| *to)
                .collect()
        };

        // The registry was acyclic before this attach, so any new cycle
        // passes through the candidate: DFS from it and look for a way back.
        let mut visited = HashSet::new();
        let mut stack = edges_from(candidate_id);
        while let Some(node) = stack.pop() {
            if node == candidate_id {
                return Err(Error::CycleDetected(candidate_id));
            }
            if visited.insert(node) {
                stack.extend(edges_from(node));
            }
        }
        Ok(())
    }
}

impl Default for ExpressionGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
