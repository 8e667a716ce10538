//! Observers
//!
//! An observer is a computed cell whose value nobody reads; it exists for a
//! side effect, such as rendering a table or a plot.
//!
//! # How Observers Work
//!
//! 1. When created, the observer is queued. It runs at the next flush, which
//!    establishes its initial dependencies. Creation itself runs nothing.
//!
//! 2. When a write dirties the observer, it is queued again.
//!
//! 3. At the end of the batch every queued observer is brought up to date,
//!    in registration order, and its value is passed to the flush
//!    subscribers. One that a read already re-evaluated is not run again.
//!
//! # Differences from Derived Cells
//!
//! - Derived cells are pulled: they stay dirty until someone reads them.
//! - Observers are pushed: they are re-evaluated before the batch ends even
//!   if nothing reads them.
//!
//! # Failures
//!
//! A failing observer does not stop the rest of the flush. Its error goes to
//! the handler given at creation (or to the log when there is none) and into
//! the [`FlushReport`]. The observer stays dirty and runs again the next
//! time a write reaches it.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::context::ReadContext;
use super::runtime::Runtime;
use crate::error::ReactiveError;
use crate::graph::{CellKey, CellKind};

/// Per-observer error channel.
pub type ErrorHandler = Box<dyn FnMut(CellKey, &ReactiveError) + Send>;

/// What happened during one flush.
#[derive(Debug, Default, Clone)]
pub struct FlushReport {
    /// Observers that evaluated successfully, in flush order.
    pub flushed: Vec<CellKey>,
    /// Observers that failed, with their errors, in flush order.
    pub failed: Vec<(CellKey, ReactiveError)>,
}

impl FlushReport {
    /// True if nothing was flushed and nothing failed.
    pub fn is_empty(&self) -> bool {
        self.flushed.is_empty() && self.failed.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Observers waiting for a flush, plus their error handlers.
#[derive(Default)]
pub(crate) struct ObserverQueue {
    /// Ordered by key, which is registration order.
    pending: BTreeSet<CellKey>,
    handlers: HashMap<CellKey, ErrorHandler>,
}

impl ObserverQueue {
    pub(crate) fn schedule(&mut self, observers: impl IntoIterator<Item = CellKey>) {
        self.pending.extend(observers);
    }

    pub(crate) fn take(&mut self) -> BTreeSet<CellKey> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn set_handler(&mut self, key: CellKey, handler: ErrorHandler) {
        self.handlers.insert(key, handler);
    }

    /// Drop everything known about a removed observer.
    pub(crate) fn forget(&mut self, key: CellKey) {
        self.pending.remove(&key);
        self.handlers.remove(&key);
    }

    pub(crate) fn pending(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.pending.iter().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Deliver an observer failure to its handler, or log it.
    fn report(&mut self, label: &str, key: CellKey, error: &ReactiveError) {
        match self.handlers.get_mut(&key) {
            Some(handler) => handler(key, error),
            None => warn!(runtime = %label, cell = %key, %error, "observer failed"),
        }
    }
}

impl fmt::Debug for ObserverQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverQueue")
            .field("pending", &self.pending)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<V> Runtime<V>
where
    V: Clone + 'static,
{
    /// Register an observer. Failures are logged.
    ///
    /// The observer first runs at the next flush: the end of the current
    /// batch, the next write, or an explicit [`flush`](Self::flush).
    pub fn create_observer<F>(&mut self, compute: F) -> CellKey
    where
        F: Fn(&mut ReadContext<'_, V>) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        let key = self.insert_computed(CellKind::Observer, Arc::new(compute));
        self.observers.schedule([key]);
        key
    }

    /// Register an observer whose failures are delivered to `on_error`.
    pub fn create_observer_with<F, H>(&mut self, compute: F, on_error: H) -> CellKey
    where
        F: Fn(&mut ReadContext<'_, V>) -> anyhow::Result<V> + Send + Sync + 'static,
        H: FnMut(CellKey, &ReactiveError) + Send + 'static,
    {
        let key = self.create_observer(compute);
        self.observers.set_handler(key, Box::new(on_error));
        key
    }

    /// Bring every queued observer up to date and announce its value.
    ///
    /// Observers run in registration order; one already evaluated by a read
    /// since it was queued reports its cached value without running again. Each success is passed to the
    /// flush subscribers; each failure to the observer's error handler. One
    /// failure never stops the others.
    pub fn flush(&mut self) -> FlushReport {
        self.recover_stale_frames();
        let mut report = FlushReport::default();

        for key in self.observers.take() {
            if !self.graph.contains(key) {
                continue;
            }

            // An observer pulled clean by a read since it was queued still
            // gets announced, with the value that read cached
            match self.pull(key) {
                Ok(value) => {
                    self.subscribers.notify(key, &value);
                    report.flushed.push(key);
                }
                Err(error) => {
                    self.observers.report(&self.config.label, key, &error);
                    report.failed.push((key, error));
                }
            }
        }

        if !report.is_empty() {
            debug!(
                runtime = %self.config.label,
                flushed = report.flushed.len(),
                failed = report.failed.len(),
                "flush"
            );
        }
        report
    }

    /// Observers queued for the next flush, in the order they will run.
    pub fn pending_observers(&self) -> Vec<CellKey> {
        self.observers.pending().collect()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
