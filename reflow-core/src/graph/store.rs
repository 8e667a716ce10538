//! Graph storage and edge maintenance.

use std::collections::HashMap;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::node::{CellKey, CellKind, Node};
use crate::error::{ReactiveError, Result};

/// Edges touched by a dependency replacement.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EdgeDiff {
    /// Dependencies read this time but not last time.
    pub added: SmallVec<[CellKey; 4]>,
    /// Dependencies read last time but not this time.
    pub removed: SmallVec<[CellKey; 4]>,
}

impl EdgeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The dependency graph: every cell's topology and dirty state, indexed by
/// key.
///
/// Edges are stored in both directions. `b ∈ a.dependencies` exactly when
/// `a ∈ b.dependents`; every mutation below updates both sides together.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<CellKey, Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new cell of the given kind.
    pub fn add_node(&mut self, kind: CellKind) -> CellKey {
        let key = CellKey::next();
        self.nodes.insert(key, Node::new(kind));
        key
    }

    /// Remove a cell.
    ///
    /// Fails with `DanglingDependency` if another cell still lists this one
    /// as a dependency; the graph is left untouched in that case.
    pub fn remove_node(&mut self, key: CellKey) -> Result<Node> {
        let node = self
            .nodes
            .get(&key)
            .ok_or(ReactiveError::UnknownCell { key })?;

        // A self-edge left behind by a cycle does not keep the cell alive
        let dependents: Vec<CellKey> = node
            .dependents()
            .iter()
            .copied()
            .filter(|dependent| *dependent != key)
            .collect();
        if !dependents.is_empty() {
            return Err(ReactiveError::DanglingDependency { key, dependents });
        }

        let node = self
            .nodes
            .remove(&key)
            .ok_or(ReactiveError::UnknownCell { key })?;

        for dependency in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dependency) {
                dep.remove_dependent(key);
            }
        }

        Ok(node)
    }

    pub fn node(&self, key: CellKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    pub(crate) fn node_mut(&mut self, key: CellKey) -> Option<&mut Node> {
        self.nodes.get_mut(&key)
    }

    pub fn contains(&self, key: CellKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over every key in the graph, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.nodes.keys().copied()
    }

    /// Add a dependency edge: `dependent` reads `dependency`.
    ///
    /// Does nothing unless both cells exist.
    pub(crate) fn add_edge(&mut self, dependency: CellKey, dependent: CellKey) {
        if !self.nodes.contains_key(&dependency) || !self.nodes.contains_key(&dependent) {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&dependency) {
            node.add_dependent(dependent);
        }
        if let Some(node) = self.nodes.get_mut(&dependent) {
            node.add_dependency(dependency);
        }
    }

    /// Remove a dependency edge.
    pub(crate) fn remove_edge(&mut self, dependency: CellKey, dependent: CellKey) {
        if let Some(node) = self.nodes.get_mut(&dependency) {
            node.remove_dependent(dependent);
        }
        if let Some(node) = self.nodes.get_mut(&dependent) {
            node.remove_dependency(dependency);
        }
    }

    /// Replace a cell's dependency set with the one discovered by its latest
    /// evaluation.
    ///
    /// Only the edges that differ are touched, so dependents of unrelated
    /// cells never see a transient gap.
    pub(crate) fn replace_dependencies(
        &mut self,
        key: CellKey,
        fresh: &IndexSet<CellKey>,
    ) -> EdgeDiff {
        let Some(node) = self.nodes.get(&key) else {
            return EdgeDiff::default();
        };

        let old = node.dependencies();
        let diff = EdgeDiff {
            removed: old.iter().filter(|k| !fresh.contains(*k)).copied().collect(),
            added: fresh
                .iter()
                .filter(|k| !old.contains(*k) && self.nodes.contains_key(*k))
                .copied()
                .collect(),
        };

        for &dependency in &diff.removed {
            self.remove_edge(dependency, key);
        }
        for &dependency in &diff.added {
            self.add_edge(dependency, key);
        }

        diff
    }

    /// Check that every edge is recorded on both of its endpoints and that
    /// sources have no dependencies.
    pub fn is_consistent(&self) -> bool {
        self.nodes.iter().all(|(key, node)| {
            let sources_ok = node.kind().is_computed() || node.dependencies().is_empty();
            let forward_ok = node.dependencies().iter().all(|dep| {
                self.nodes
                    .get(dep)
                    .is_some_and(|d| d.dependents().contains(key))
            });
            let backward_ok = node.dependents().iter().all(|dependent| {
                self.nodes
                    .get(dependent)
                    .is_some_and(|d| d.dependencies().contains(key))
            });
            sources_ok && forward_ok && backward_ok
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[CellKey]) -> IndexSet<CellKey> {
        keys.iter().copied().collect()
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = Graph::new();

        let source = graph.add_node(CellKind::Source);
        let derived = graph.add_node(CellKind::Derived);
        assert_eq!(graph.len(), 2);

        graph.remove_node(source).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.node(source).is_none());
        assert!(graph.node(derived).is_some());
    }

    #[test]
    fn add_and_remove_edges() {
        let mut graph = Graph::new();
        let source = graph.add_node(CellKind::Source);
        let derived = graph.add_node(CellKind::Derived);

        graph.add_edge(source, derived);
        assert!(graph.node(source).unwrap().dependents().contains(&derived));
        assert!(graph.node(derived).unwrap().dependencies().contains(&source));
        assert!(graph.is_consistent());

        graph.remove_edge(source, derived);
        assert!(graph.node(source).unwrap().dependents().is_empty());
        assert!(graph.node(derived).unwrap().dependencies().is_empty());
        assert!(graph.is_consistent());
    }

    #[test]
    fn edges_to_missing_nodes_are_ignored() {
        let mut graph = Graph::new();
        let derived = graph.add_node(CellKind::Derived);
        let ghost = CellKey::next();

        graph.add_edge(ghost, derived);
        assert!(graph.node(derived).unwrap().dependencies().is_empty());
    }

    #[test]
    fn remove_rejects_live_dependents() {
        let mut graph = Graph::new();
        let source = graph.add_node(CellKind::Source);
        let derived = graph.add_node(CellKind::Derived);
        graph.add_edge(source, derived);

        let err = graph.remove_node(source).unwrap_err();
        match err {
            ReactiveError::DanglingDependency { key, dependents } => {
                assert_eq!(key, source);
                assert_eq!(dependents, vec![derived]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing changed
        assert_eq!(graph.len(), 2);
        assert!(graph.is_consistent());

        // Removing the reader first detaches the edge
        graph.remove_node(derived).unwrap();
        assert!(graph.node(source).unwrap().dependents().is_empty());
        graph.remove_node(source).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn remove_unknown_key_fails() {
        let mut graph = Graph::new();
        let key = CellKey::next();
        assert!(matches!(
            graph.remove_node(key),
            Err(ReactiveError::UnknownCell { .. })
        ));
    }

    #[test]
    fn replace_dependencies_applies_diff() {
        let mut graph = Graph::new();
        let a = graph.add_node(CellKind::Source);
        let b = graph.add_node(CellKind::Source);
        let c = graph.add_node(CellKind::Source);
        let derived = graph.add_node(CellKind::Derived);

        let diff = graph.replace_dependencies(derived, &set(&[a, b]));
        assert_eq!(diff.added.as_slice(), &[a, b]);
        assert!(diff.removed.is_empty());

        let diff = graph.replace_dependencies(derived, &set(&[b, c]));
        assert_eq!(diff.added.as_slice(), &[c]);
        assert_eq!(diff.removed.as_slice(), &[a]);

        assert!(graph.node(a).unwrap().dependents().is_empty());
        assert!(graph.node(b).unwrap().dependents().contains(&derived));
        assert!(graph.node(c).unwrap().dependents().contains(&derived));
        assert!(graph.is_consistent());

        let diff = graph.replace_dependencies(derived, &set(&[b, c]));
        assert!(diff.is_empty());
    }

    #[test]
    fn replace_dependencies_leaves_other_readers_alone() {
        let mut graph = Graph::new();
        let a = graph.add_node(CellKind::Source);
        let first = graph.add_node(CellKind::Derived);
        let second = graph.add_node(CellKind::Derived);

        graph.replace_dependencies(first, &set(&[a]));
        graph.replace_dependencies(second, &set(&[a]));
        graph.replace_dependencies(first, &set(&[]));

        let readers: Vec<_> = graph.node(a).unwrap().dependents().iter().copied().collect();
        assert_eq!(readers, vec![second]);
        assert!(graph.is_consistent());
    }
}
