//! Batches
//!
//! A batch is the unit of work between two observer flushes. By default
//! every write is its own batch. Bracketing several writes with
//! [`begin_batch`](Runtime::begin_batch) and [`end_batch`](Runtime::end_batch)
//! coalesces them: each observer dirtied inside the batch flushes once, at
//! the end, against the final values.
//!
//! Batches nest. Only the outermost `end_batch` flushes.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use super::observer::FlushReport;
use super::runtime::Runtime;
use crate::error::{ReactiveError, Result};

impl<V> Runtime<V>
where
    V: Clone + 'static,
{
    /// Open a batch. Observer flushes are deferred until it is closed.
    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
        debug!(runtime = %self.config.label, depth = self.batch_depth, "begin batch");
    }

    /// Close a batch, flushing observers if it was the outermost one.
    ///
    /// Inner batches return an empty report.
    pub fn end_batch(&mut self) -> Result<FlushReport> {
        if self.batch_depth == 0 {
            return Err(ReactiveError::NoActiveBatch);
        }
        self.batch_depth -= 1;
        debug!(runtime = %self.config.label, depth = self.batch_depth, "end batch");

        if self.batch_depth > 0 {
            return Ok(FlushReport::default());
        }
        Ok(self.flush())
    }

    /// Run `f` inside a batch.
    ///
    /// If `f` panics the batch is closed without flushing before the panic
    /// continues, so a runtime that outlives the panic (for example behind
    /// a [`SharedRuntime`](crate::SharedRuntime)) keeps flushing on write.
    /// Observers dirtied inside it stay queued for the next flush.
    ///
    /// ```rust
    /// use reflow_core::Runtime;
    ///
    /// let mut rt = Runtime::new();
    /// let lo = rt.create_source(0_i64);
    /// let hi = rt.create_source(10_i64);
    /// let span = rt.create_observer(move |cx| Ok(cx.read(hi)? - cx.read(lo)?));
    /// rt.flush();
    ///
    /// rt.batch(|rt| {
    ///     rt.write(lo, 5)?;
    ///     rt.write(hi, 50)
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(rt.read(span).unwrap(), 45);
    /// ```
    pub fn batch<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.begin_batch();
        let depth = self.batch_depth;
        let out = match panic::catch_unwind(AssertUnwindSafe(|| f(&mut *self))) {
            Ok(out) => out,
            Err(payload) => {
                self.batch_depth = depth - 1;
                warn!(runtime = %self.config.label, depth = self.batch_depth, "batch closure panicked");
                panic::resume_unwind(payload);
            }
        };

        if self.batch_depth != depth {
            warn!(
                runtime = %self.config.label,
                expected = depth,
                actual = self.batch_depth,
                "unbalanced batch inside closure"
            );
        }
        if let Err(error) = self.end_batch() {
            warn!(runtime = %self.config.label, %error, "closing batch");
        }
        out
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    pub fn batch_depth(&self) -> usize {
        self.batch_depth
    }
}
