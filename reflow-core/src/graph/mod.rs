//! Dependency Graph
//!
//! This module implements the graph that records which cells read which.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes are cells: sources, derived cells and observers
//! - Edges are reads: if A read B during its last evaluation, there is an
//!   edge from B to A
//!
//! When a source changes, we walk the graph to find every affected cell
//! and mark it dirty. Recomputation happens later, on read.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized rather than spread across the cells, so the
//!    invalidation walk and cycle diagnostics see the whole topology.
//!
//! 2. The graph is indexed by key for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    and keep them in insertion order, so traversal is deterministic.
//!
//! 4. Edges are discovered at evaluation time. Cycles can only be detected
//!    during an evaluation attempt, which is the runtime's job.

mod node;
mod scheduler;
mod store;

pub use node::{CellKey, CellKind, CellState, Node};
pub use scheduler::Invalidation;
pub use store::{EdgeDiff, Graph};
