//! Invalidation
//!
//! When a source changes, every cell that transitively read it must be
//! marked dirty before anything reads again.
//!
//! # Algorithm
//!
//! 1. Start from the changed cell's direct dependents (or from the cell
//!    itself when a computed cell is invalidated by hand)
//! 2. Walk `dependents` breadth-first, marking each reached cell dirty
//! 3. Skip cells already visited in this walk, so diamonds cost O(edges)
//! 4. Collect the observers reached so the runtime can flush them
//!
//! Nothing is recomputed here. Derived cells stay dirty until read.
//!
//! Reads that nest deeper than the runtime allows fall back on
//! [`Graph::stale_dependencies`], which lists the dirty cells below a cell
//! deepest first so they can be evaluated one at a time.
//!
//! Cells that were already dirty are still walked through: a cell can be
//! clean while one of its dependencies is dirty if its compute recovered
//! from a failed read, and it must not be missed.

use std::collections::{HashSet, VecDeque};

use super::node::{CellKey, CellKind};
use super::store::Graph;

/// The outcome of one invalidation walk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Invalidation {
    /// Every computed cell reached, in visit order.
    pub dirtied: Vec<CellKey>,
    /// The observers among `dirtied`.
    pub observers: Vec<CellKey>,
}

impl Graph {
    /// Mark everything downstream of `origin` dirty.
    ///
    /// If `origin` is itself a computed cell it is marked too.
    pub fn mark_changed(&mut self, origin: CellKey) -> Invalidation {
        let mut invalidation = Invalidation::default();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        match self.node(origin) {
            Some(node) if node.kind().is_computed() => queue.push_back(origin),
            Some(node) => queue.extend(node.dependents().iter().copied()),
            None => return invalidation,
        }

        while let Some(key) = queue.pop_front() {
            if !visited.insert(key) {
                continue;
            }

            let Some(node) = self.node_mut(key) else {
                continue;
            };
            if !node.kind().is_computed() {
                continue;
            }

            node.mark_dirty();
            invalidation.dirtied.push(key);
            if node.kind() == CellKind::Observer {
                invalidation.observers.push(key);
            }

            queue.extend(node.dependents().iter().copied());
        }

        invalidation
    }

    /// Dirty computed cells reachable from `key` through recorded
    /// dependencies, each listed after everything it depends on.
    ///
    /// `key` itself is not included. Clean cells end the walk, since their
    /// own dependencies are clean too.
    pub fn stale_dependencies(&self, key: CellKey) -> Vec<CellKey> {
        let mut order = Vec::new();
        let mut visited = HashSet::from([key]);
        let mut stack: Vec<(CellKey, bool)> = Vec::new();

        let is_stale = |dep: CellKey| {
            self.node(dep)
                .is_some_and(|node| node.kind().is_computed() && !node.is_clean())
        };

        if let Some(node) = self.node(key) {
            stack.extend(
                node.dependencies()
                    .iter()
                    .rev()
                    .filter(|&&d| is_stale(d))
                    .map(|&d| (d, false)),
            );
        }

        while let Some((cell, expanded)) = stack.pop() {
            if expanded {
                order.push(cell);
                continue;
            }
            if !visited.insert(cell) {
                continue;
            }
            stack.push((cell, true));
            if let Some(node) = self.node(cell) {
                stack.extend(
                    node.dependencies()
                        .iter()
                        .rev()
                        .filter(|&&d| !visited.contains(&d) && is_stale(d))
                        .map(|&d| (d, false)),
                );
            }
        }

        order
    }
}
