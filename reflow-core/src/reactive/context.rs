//! Read Context
//!
//! The read context tracks which computation is currently running. This
//! enables automatic dependency tracking: when a compute function reads a
//! cell, the runtime records that cell as a dependency of the computation.
//!
//! # Implementation
//!
//! The runtime owns a stack of frames. When a derived cell or observer is
//! evaluated, a frame for it is pushed; every `read` made through the
//! [`ReadContext`] handed to its compute function lands in the top frame.
//! When the compute function returns, the frame is popped and its reads
//! become the cell's new dependency set.
//!
//! The stack lives in the runtime rather than in thread-local storage, so
//! two runtimes on the same thread never see each other's frames, and a
//! compute function can only discover dependencies through the context it
//! was given.
//!
//! Nested evaluation (C reads D, D is dirty and evaluates, D reads E) pushes
//! one frame per level.

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::runtime::Runtime;
use crate::error::Result;
use crate::graph::CellKey;

/// An entry in the evaluation stack.
#[derive(Debug, Clone)]
struct Frame {
    /// The cell being evaluated.
    key: CellKey,
    /// Cells read so far, in first-read order.
    reads: IndexSet<CellKey>,
}

/// The evaluation stack of one runtime.
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    frames: SmallVec<[Frame; 8]>,
}

impl ContextStack {
    pub(crate) fn push(&mut self, key: CellKey) {
        self.frames.push(Frame {
            key,
            reads: IndexSet::new(),
        });
    }

    /// Pop the frame for `key` and return what it read.
    pub(crate) fn pop(&mut self, key: CellKey) -> IndexSet<CellKey> {
        match self.frames.pop() {
            Some(frame) => {
                debug_assert_eq!(
                    frame.key, key,
                    "evaluation stack mismatch: expected {}, got {}",
                    key, frame.key
                );
                frame.reads
            }
            None => IndexSet::new(),
        }
    }

    /// Record a read in the top frame, if any.
    pub(crate) fn track(&mut self, key: CellKey) {
        if let Some(frame) = self.frames.last_mut() {
            frame.reads.insert(key);
        }
    }

    pub(crate) fn current(&self) -> Option<CellKey> {
        self.frames.last().map(|frame| frame.key)
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    /// The cycle closed by reading `key` again: every frame from the first
    /// occurrence of `key` up to the top, followed by `key` itself.
    pub(crate) fn cycle_path(&self, key: CellKey) -> Vec<CellKey> {
        let start = self
            .frames
            .iter()
            .position(|frame| frame.key == key)
            .unwrap_or(0);
        self.frames[start..]
            .iter()
            .map(|frame| frame.key)
            .chain(std::iter::once(key))
            .collect()
    }

    /// Discard every frame, returning the keys that were being evaluated.
    pub(crate) fn drain(&mut self) -> Vec<CellKey> {
        self.frames.drain(..).map(|frame| frame.key).collect()
    }
}

/// Handle passed to compute functions.
///
/// Reads made through it are recorded as dependencies of the cell being
/// computed.
///
/// ```rust
/// use reflow_core::Runtime;
///
/// let mut rt = Runtime::new();
/// let bins = rt.create_source(10_i64);
/// let width = rt.create_derived(move |cx| Ok(100 / cx.read(bins)?));
///
/// assert_eq!(rt.read(width).unwrap(), 10);
/// assert_eq!(rt.dependencies(width), vec![bins]);
/// ```
pub struct ReadContext<'a, V> {
    runtime: &'a mut Runtime<V>,
}

impl<'a, V> ReadContext<'a, V>
where
    V: Clone + 'static,
{
    pub(crate) fn new(runtime: &'a mut Runtime<V>) -> Self {
        Self { runtime }
    }

    /// Read a cell and record it as a dependency of the current computation.
    ///
    /// Dirty cells are evaluated first.
    pub fn read(&mut self, key: CellKey) -> Result<V> {
        self.runtime.read_tracked(key)
    }

    /// Read a cell without recording a dependency.
    ///
    /// Later changes to `key` will not dirty the current computation.
    pub fn read_untracked(&mut self, key: CellKey) -> Result<V> {
        self.runtime.read_value(key)
    }

    /// The cell currently being computed.
    pub fn current(&self) -> Option<CellKey> {
        self.runtime.stack.current()
    }

    /// Number of evaluations currently nested, including this one.
    pub fn depth(&self) -> usize {
        self.runtime.stack.depth()
    }
}
