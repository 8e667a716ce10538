//! Reflow Core
//!
//! This crate provides the dataflow kernel behind a reactive dashboard
//! framework: named input cells, cached derived cells, and observers that
//! turn values into output. It implements:
//!
//! - Lazy, cached evaluation of derived cells
//! - Dynamic dependency discovery during evaluation
//! - Dirty marking on write, without recomputation
//! - Eager, batched observer flushes
//! - Cycle detection at evaluation time
//!
//! Widgets, rendering, transport and plotting are not part of the kernel.
//! They plug in as compute functions and flush subscribers.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: cells, dependency edges, and the invalidation walk
//! - `reactive`: the runtime, read context, observers and batches
//! - `error`: the error type shared by both
//! - `config`: runtime settings
//!
//! # Example
//!
//! ```rust
//! use reflow_core::Runtime;
//!
//! let mut rt = Runtime::new();
//!
//! // An input
//! let bins = rt.create_source(10_i64);
//!
//! // A derived value
//! let width = rt.create_derived(move |cx| Ok(1000 / cx.read(bins)?));
//!
//! // An output
//! let label = rt.create_observer(move |cx| {
//!     let w = cx.read(width)?;
//!     println!("bin width: {w}");
//!     Ok(w)
//! });
//! rt.flush(); // prints "bin width: 100"
//!
//! // Update the input; the observer runs before write returns
//! rt.write(bins, 20).unwrap(); // prints "bin width: 50"
//! assert_eq!(rt.read(label).unwrap(), 50);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use graph::{CellKey, CellKind};
pub use reactive::{FlushReport, ReadContext, Runtime, SharedRuntime, SubscriberId};
