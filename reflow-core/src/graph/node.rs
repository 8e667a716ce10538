//! Graph Nodes
//!
//! This module defines the cells that live in the dependency graph. A node
//! only carries topology and dirty state; values and compute functions live
//! in the runtime.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Opaque handle to a cell in the dependency graph.
///
/// Keys come from a process-wide counter, so they are unique across every
/// runtime in the process and their ordering is registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey(u64);

impl CellKey {
    /// Generate a new unique cell key.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw key value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of cell in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    /// An input cell. Its value is set from outside and it never has
    /// dependencies, only dependents.
    Source,

    /// A computed cell. Evaluated lazily on read and cached until one of its
    /// dependencies is invalidated.
    Derived,

    /// A computed cell whose purpose is a side effect. Re-evaluated eagerly
    /// at the end of every batch that dirties it.
    Observer,
}

impl CellKind {
    /// Whether cells of this kind run a compute function.
    pub fn is_computed(self) -> bool {
        !matches!(self, CellKind::Source)
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CellKind::Source => "source",
            CellKind::Derived => "derived",
            CellKind::Observer => "observer",
        };
        f.write_str(name)
    }
}

/// Evaluation state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// The cached value reflects the current values of every dependency.
    Clean,

    /// The cached value is stale or absent and must be recomputed before use.
    Dirty,

    /// The cell's compute function is on the evaluation stack right now.
    /// Reading a cell in this state means the graph has a cycle.
    Computing,
}

/// A cell in the dependency graph.
#[derive(Debug)]
pub struct Node {
    kind: CellKind,
    state: CellState,

    /// Cells this cell read during its most recent evaluation.
    dependencies: IndexSet<CellKey>,

    /// Cells that read this cell during their most recent evaluation.
    dependents: IndexSet<CellKey>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: CellKind) -> Self {
        Self {
            kind,
            state: match kind {
                CellKind::Source => CellState::Clean,
                // Start dirty so the first read computes
                CellKind::Derived | CellKind::Observer => CellState::Dirty,
            },
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
        }
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn is_clean(&self) -> bool {
        self.state == CellState::Clean
    }

    pub fn is_dirty(&self) -> bool {
        self.state == CellState::Dirty
    }

    pub fn is_computing(&self) -> bool {
        self.state == CellState::Computing
    }

    /// Mark the node as clean. Sources are always clean.
    pub fn mark_clean(&mut self) {
        self.state = CellState::Clean;
    }

    /// Mark the node as needing recomputation. No-op for sources.
    pub fn mark_dirty(&mut self) {
        if self.kind.is_computed() {
            self.state = CellState::Dirty;
        }
    }

    /// Flag the node as being evaluated.
    pub fn mark_computing(&mut self) {
        self.state = CellState::Computing;
    }

    pub fn dependencies(&self) -> &IndexSet<CellKey> {
        &self.dependencies
    }

    pub fn dependents(&self) -> &IndexSet<CellKey> {
        &self.dependents
    }

    pub(crate) fn add_dependency(&mut self, key: CellKey) -> bool {
        self.dependencies.insert(key)
    }

    pub(crate) fn remove_dependency(&mut self, key: CellKey) -> bool {
        self.dependencies.shift_remove(&key)
    }

    pub(crate) fn add_dependent(&mut self, key: CellKey) -> bool {
        self.dependents.insert(key)
    }

    pub(crate) fn remove_dependent(&mut self, key: CellKey) -> bool {
        self.dependents.shift_remove(&key)
    }
}
