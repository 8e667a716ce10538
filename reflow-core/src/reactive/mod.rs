//! Reactive Primitives
//!
//! This module implements the reactive layer on top of the dependency
//! graph: the runtime, the read context handed to compute functions,
//! observer flushing and batches.
//!
//! # Concepts
//!
//! ## Sources
//!
//! A source is a container for an input value, set from outside the graph
//! (a slider, a file picker, a checkbox). Writing a source invalidates every
//! cell that read it.
//!
//! ## Derived Cells
//!
//! A derived cell caches the result of a compute function. It re-evaluates
//! only when read after one of its dependencies changed, so expensive steps
//! such as aggregating a dataset are not repeated unnecessarily.
//!
//! ## Observers
//!
//! An observer is a computation run for its side effect, such as producing
//! rendered output. It re-runs at the end of every batch that dirties it,
//! whether or not anything reads it.
//!
//! # Implementation Notes
//!
//! Compute functions receive a [`ReadContext`]. Every read made through it
//! is recorded as a dependency of the cell being computed, so dependencies
//! never have to be declared up front and may change from one evaluation to
//! the next.

mod batch;
mod context;
mod observer;
mod runtime;
mod subscriber;

pub use context::ReadContext;
pub use observer::{ErrorHandler, FlushReport};
pub use runtime::{ComputeFn, Runtime, SharedRuntime};
pub use subscriber::SubscriberId;
