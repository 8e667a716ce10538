//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects sources, derived
//! cells and observers. It owns the dependency graph, the cached values and
//! the evaluation stack.
//!
//! # How It Works
//!
//! 1. Cells are registered with the runtime and identified by [`CellKey`].
//!    Registration never runs a compute function.
//!
//! 2. A read of a dirty derived cell pushes a frame, runs the compute
//!    function with a [`ReadContext`], and replaces the cell's dependency
//!    set with what it read. The result is cached and the cell is clean.
//!
//! 3. A read of a clean cell returns the cached value.
//!
//!    Nesting is capped by `max_depth`. A top-level read that hits the cap
//!    evaluates the dirty cells below it deepest first, then retries.
//!
//! 4. A write to a source:
//!    a. Stores the new value
//!    b. Walks the dependents and marks them dirty
//!    c. Queues the dirtied observers
//!    d. Flushes the observers, unless a batch is open
//!
//! Derived cells are lazy: a write only marks them.
//!
//! # Thread Safety
//!
//! A runtime is a single-owner handle; every operation takes `&mut self`.
//! Edge updates during evaluation are not atomic with respect to other
//! callers, so concurrent use must be serialized by the caller, for example
//! through [`SharedRuntime`]. Independent runtimes share nothing and can
//! run on separate threads freely.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::context::{ContextStack, ReadContext};
use super::observer::{FlushReport, ObserverQueue};
use super::subscriber::Subscribers;
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::graph::{CellKey, CellKind, Graph};

/// A compute function as stored by the runtime.
pub type ComputeFn<V> =
    Arc<dyn Fn(&mut ReadContext<'_, V>) -> anyhow::Result<V> + Send + Sync>;

/// A runtime behind a mutex, for callers that need to share one graph
/// between threads.
pub type SharedRuntime<V> = Arc<Mutex<Runtime<V>>>;

/// Per-cell storage that the graph does not hold.
pub(super) enum Slot<V> {
    Source(V),
    Computed {
        compute: ComputeFn<V>,
        /// Last successful result, `None` before the first evaluation.
        value: Option<V>,
    },
}

/// What a read has to do.
enum Lookup<V> {
    Cached(V),
    Evaluate(ComputeFn<V>),
}

/// A reactive dataflow graph with lazy evaluation.
///
/// # Example
///
/// ```rust
/// use reflow_core::Runtime;
///
/// let mut rt = Runtime::new();
/// let n1 = rt.create_source(2_i64);
/// let doubled = rt.create_derived(move |cx| Ok(cx.read(n1)? * 2));
///
/// assert_eq!(rt.read(doubled).unwrap(), 4);
///
/// rt.write(n1, 5).unwrap();
/// assert_eq!(rt.read(doubled).unwrap(), 10);
/// ```
pub struct Runtime<V> {
    pub(super) config: RuntimeConfig,
    pub(super) graph: Graph,
    pub(super) slots: HashMap<CellKey, Slot<V>>,
    pub(super) stack: ContextStack,
    pub(super) observers: ObserverQueue,
    pub(super) subscribers: Subscribers<V>,
    pub(super) batch_depth: usize,
    pub(super) evaluations: u64,
}

impl<V> Runtime<V>
where
    V: Clone + 'static,
{
    /// Create an empty runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            config,
            graph: Graph::new(),
            slots: HashMap::new(),
            stack: ContextStack::default(),
            observers: ObserverQueue::default(),
            subscribers: Subscribers::default(),
            batch_depth: 0,
            evaluations: 0,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Register a source cell with its starting value.
    pub fn create_source(&mut self, value: V) -> CellKey {
        let key = self.graph.add_node(CellKind::Source);
        self.slots.insert(key, Slot::Source(value));
        trace!(runtime = %self.config.label, cell = %key, "create source");
        key
    }

    /// Register a derived cell.
    ///
    /// `compute` does not run until the cell is first read.
    pub fn create_derived<F>(&mut self, compute: F) -> CellKey
    where
        F: Fn(&mut ReadContext<'_, V>) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        self.insert_computed(CellKind::Derived, Arc::new(compute))
    }

    pub(super) fn insert_computed(&mut self, kind: CellKind, compute: ComputeFn<V>) -> CellKey {
        let key = self.graph.add_node(kind);
        self.slots.insert(
            key,
            Slot::Computed {
                compute,
                value: None,
            },
        );
        trace!(runtime = %self.config.label, cell = %key, %kind, "create computed");
        key
    }

    // ------------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------------

    /// Get a cell's current value, recomputing it first if it is dirty.
    ///
    /// Fails with `Cycle` if evaluation re-enters a cell that is already
    /// being computed, and with the compute function's own error if it
    /// fails. A failed evaluation is not cached; the next read retries.
    pub fn read(&mut self, key: CellKey) -> Result<V> {
        self.recover_stale_frames();
        self.pull(key)
    }

    /// Top-level read that is not limited by `max_depth`.
    ///
    /// When nested evaluation runs too deep, the dirty cells recorded below
    /// `key` are evaluated deepest first, each from an empty stack, and the
    /// read is retried against their cached values.
    pub(super) fn pull(&mut self, key: CellKey) -> Result<V> {
        loop {
            match self.read_value(key) {
                Err(error @ ReactiveError::DepthExceeded { .. }) => {
                    if !self.settle_dependencies(key)? {
                        return Err(error);
                    }
                }
                result => return result,
            }
        }
    }

    /// Returns whether any dirty cell below `key` became clean.
    ///
    /// Every attempt that runs out of depth still records the edges it
    /// walked, so each pass either cleans a cell or discovers deeper ones.
    fn settle_dependencies(&mut self, key: CellKey) -> Result<bool> {
        let mut settled = false;
        for _ in 0..=self.graph.len() {
            let stale = self.graph.stale_dependencies(key);
            let mut progressed = false;
            for &cell in &stale {
                match self.read_value(cell) {
                    Ok(_) => progressed = true,
                    Err(ReactiveError::DepthExceeded { .. }) => break,
                    Err(error) => return Err(error),
                }
            }
            settled |= progressed;

            if stale.is_empty() || (!progressed && self.graph.stale_dependencies(key) == stale) {
                break;
            }
            trace!(runtime = %self.config.label, cell = %key, stale = stale.len(), "settling");
        }
        Ok(settled)
    }

    /// Read on behalf of the computation on top of the stack.
    pub(crate) fn read_tracked(&mut self, key: CellKey) -> Result<V> {
        if !self.graph.contains(key) {
            return Err(ReactiveError::UnknownCell { key });
        }
        self.stack.track(key);
        self.read_value(key)
    }

    pub(crate) fn read_value(&mut self, key: CellKey) -> Result<V> {
        let node = self
            .graph
            .node(key)
            .ok_or(ReactiveError::UnknownCell { key })?;

        if node.is_computing() {
            let path = self.stack.cycle_path(key);
            debug!(runtime = %self.config.label, cell = %key, ?path, "cycle detected");
            return Err(ReactiveError::Cycle { path });
        }

        let lookup = match self.slots.get(&key) {
            Some(Slot::Source(value)) => Lookup::Cached(value.clone()),
            Some(Slot::Computed {
                value: Some(value), ..
            }) if node.is_clean() => Lookup::Cached(value.clone()),
            Some(Slot::Computed { compute, .. }) => Lookup::Evaluate(Arc::clone(compute)),
            None => return Err(ReactiveError::UnknownCell { key }),
        };

        match lookup {
            Lookup::Cached(value) => Ok(value),
            Lookup::Evaluate(compute) => self.evaluate(key, compute),
        }
    }

    /// Run a cell's compute function and cache the result.
    fn evaluate(&mut self, key: CellKey, compute: ComputeFn<V>) -> Result<V> {
        let limit = self.config.max_depth;
        if self.stack.depth() >= limit {
            return Err(ReactiveError::DepthExceeded { key, limit });
        }

        if let Some(node) = self.graph.node_mut(key) {
            node.mark_computing();
        }
        self.stack.push(key);
        self.evaluations += 1;
        trace!(
            runtime = %self.config.label,
            cell = %key,
            depth = self.stack.depth(),
            "evaluate: start"
        );

        let result = {
            let mut cx = ReadContext::new(self);
            compute(&mut cx)
        };

        // Dependencies are replaced whether or not the compute succeeded
        let reads = self.stack.pop(key);
        let diff = self.graph.replace_dependencies(key, &reads);
        if !diff.is_empty() {
            trace!(
                runtime = %self.config.label,
                cell = %key,
                added = ?diff.added,
                removed = ?diff.removed,
                "edges updated"
            );
        }

        match result {
            Ok(value) => {
                if let Some(node) = self.graph.node_mut(key) {
                    node.mark_clean();
                }
                if let Some(Slot::Computed { value: cached, .. }) = self.slots.get_mut(&key) {
                    *cached = Some(value.clone());
                }
                trace!(runtime = %self.config.label, cell = %key, "evaluate: done");
                Ok(value)
            }
            Err(error) => {
                if let Some(node) = self.graph.node_mut(key) {
                    node.mark_dirty();
                }
                let error = ReactiveError::from_compute(key, error);
                debug!(runtime = %self.config.label, cell = %key, %error, "evaluate: failed");
                Err(error)
            }
        }
    }

    /// Clean up after a compute function panicked and unwound through the
    /// runtime.
    ///
    /// Top-level calls are never made while a computation is running, so
    /// any frame still on the stack at that point is left over from a panic.
    pub(super) fn recover_stale_frames(&mut self) {
        if !self.stack.is_active() {
            return;
        }
        let stale = self.stack.drain();
        warn!(runtime = %self.config.label, cells = ?stale, "discarding stale evaluation frames");
        for key in stale {
            if let Some(node) = self.graph.node_mut(key) {
                node.mark_dirty();
            }
        }
    }

    // ------------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------------

    /// Set a source cell's value and invalidate everything downstream.
    ///
    /// Outside a batch, dirtied observers are flushed before this returns
    /// and the returned report lists their successes and failures; inside a
    /// batch the report is empty and `end_batch` returns the real one.
    /// Fails with `NotASource` on derived cells and observers, before any
    /// change is made.
    pub fn write(&mut self, key: CellKey, value: V) -> Result<FlushReport> {
        self.recover_stale_frames();
        match self.slots.get_mut(&key) {
            Some(Slot::Source(current)) => *current = value,
            Some(Slot::Computed { .. }) => {
                let kind = self
                    .graph
                    .node(key)
                    .map(|node| node.kind())
                    .unwrap_or(CellKind::Derived);
                return Err(ReactiveError::NotASource { key, kind });
            }
            None => return Err(ReactiveError::UnknownCell { key }),
        }

        debug!(runtime = %self.config.label, cell = %key, "write");
        Ok(self.propagate(key))
    }

    /// Replace a source value with a function of the current one.
    pub fn update<F>(&mut self, key: CellKey, f: F) -> Result<FlushReport>
    where
        F: FnOnce(&V) -> V,
    {
        let next = match self.slots.get(&key) {
            Some(Slot::Source(current)) => f(current),
            _ => return Err(self.reject_write(key)),
        };
        self.write(key, next)
    }

    /// Write only if the value differs from the current one.
    ///
    /// Returns `None` when the value was equal and nothing happened, else
    /// the report of the write. Plain [`write`](Self::write) always
    /// invalidates; this is the opt-in equality short-circuit.
    pub fn write_if_changed(&mut self, key: CellKey, value: V) -> Result<Option<FlushReport>>
    where
        V: PartialEq,
    {
        let unchanged = match self.slots.get(&key) {
            Some(Slot::Source(current)) => *current == value,
            _ => return Err(self.reject_write(key)),
        };
        if unchanged {
            return Ok(None);
        }
        self.write(key, value).map(Some)
    }

    fn reject_write(&self, key: CellKey) -> ReactiveError {
        match self.graph.node(key) {
            Some(node) => ReactiveError::NotASource {
                key,
                kind: node.kind(),
            },
            None => ReactiveError::UnknownCell { key },
        }
    }

    /// Mark a derived cell or observer dirty without touching any source.
    ///
    /// Its dependents are invalidated and observers scheduled and flushed as
    /// for a [`write`](Self::write), with the same report.
    pub fn invalidate(&mut self, key: CellKey) -> Result<FlushReport> {
        self.recover_stale_frames();
        let node = self
            .graph
            .node(key)
            .ok_or(ReactiveError::UnknownCell { key })?;
        if !node.kind().is_computed() {
            return Err(ReactiveError::NotComputed { key });
        }

        debug!(runtime = %self.config.label, cell = %key, "invalidate");
        Ok(self.propagate(key))
    }

    fn propagate(&mut self, origin: CellKey) -> FlushReport {
        let invalidation = self.graph.mark_changed(origin);
        debug!(
            runtime = %self.config.label,
            cell = %origin,
            dirtied = invalidation.dirtied.len(),
            observers = invalidation.observers.len(),
            "invalidated"
        );
        self.observers.schedule(invalidation.observers);

        if self.batch_depth > 0 {
            return FlushReport::default();
        }
        self.flush()
    }

    // ------------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------------

    /// Remove a cell.
    ///
    /// Fails with `DanglingDependency` while other cells still read it;
    /// remove those first. Nothing changes on failure.
    pub fn remove(&mut self, key: CellKey) -> Result<()> {
        self.recover_stale_frames();
        let node = self.graph.remove_node(key)?;
        self.slots.remove(&key);
        self.observers.forget(key);
        debug!(runtime = %self.config.label, cell = %key, kind = %node.kind(), "remove");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub fn kind(&self, key: CellKey) -> Option<CellKind> {
        self.graph.node(key).map(|node| node.kind())
    }

    /// Whether the cell's cached value is stale. `None` for unknown keys.
    pub fn is_dirty(&self, key: CellKey) -> Option<bool> {
        self.graph.node(key).map(|node| !node.is_clean())
    }

    /// Cells read by `key` during its last evaluation.
    pub fn dependencies(&self, key: CellKey) -> Vec<CellKey> {
        self.graph
            .node(key)
            .map(|node| node.dependencies().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Cells whose last evaluation read `key`.
    pub fn dependents(&self, key: CellKey) -> Vec<CellKey> {
        self.graph
            .node(key)
            .map(|node| node.dependents().iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: CellKey) -> bool {
        self.graph.contains(key)
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Total number of compute function invocations so far.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluations
    }

    /// Wrap the runtime in a mutex for shared use.
    pub fn into_shared(self) -> SharedRuntime<V> {
        Arc::new(Mutex::new(self))
    }
}

impl<V> Default for Runtime<V>
where
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for Runtime<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("label", &self.config.label)
            .field("cells", &self.graph.len())
            .field("batch_depth", &self.batch_depth)
            .field("pending_observers", &self.observers.len())
            .field("evaluations", &self.evaluations)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
