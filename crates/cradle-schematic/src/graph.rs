//! Dependency graph management using `petgraph`.
//!
//! Builds a directed graph from component dependencies and resolves a
//! deterministic dependency-first ordering: a component never precedes any
//! of its dependencies, and components without a mutual ordering
//! constraint keep their insertion order.

use std::collections::HashMap;

use cradle_common::error::{CradleError, Result};
use petgraph::Direction;
use petgraph::graph::NodeIndex;

/// A dependency graph of components, keyed by component name.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Internal petgraph representation.
    graph: petgraph::Graph<String, ()>,
    /// Name-to-node lookup; names are the component identity.
    indices: HashMap<String, NodeIndex>,
}

/// Traversal colors for cycle-aware depth-first search.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component node, returning the existing node when the name is
    /// already registered.
    pub fn add_component(&mut self, name: impl Into<String>) -> NodeIndex {
        let name = name.into();
        if let Some(&idx) = self.indices.get(&name) {
            return idx;
        }
        let idx = self.graph.add_node(name.clone());
        let _ = self.indices.insert(name, idx);
        idx
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent` so that
    /// resolution yields dependencies first. Duplicate edges collapse.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        let _ = self.graph.update_edge(dependency, dependent, ());
    }

    /// Returns a dependency-first ordering of component names.
    ///
    /// The traversal visits nodes in insertion order and emits each node
    /// after all of its dependencies, so callers that register components
    /// in their supplied order get that order back wherever the graph
    /// leaves it unconstrained.
    ///
    /// # Errors
    ///
    /// Returns [`CradleError::CyclicDependency`] naming the cycle's
    /// members if the graph contains a cycle; never hangs.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut path = Vec::new();
        for idx in self.graph.node_indices() {
            self.visit(idx, &mut marks, &mut order, &mut path)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        idx: NodeIndex,
        marks: &mut [Mark],
        order: &mut Vec<String>,
        path: &mut Vec<NodeIndex>,
    ) -> Result<()> {
        match marks[idx.index()] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(self.cycle_error(idx, path)),
            Mark::Unvisited => {}
        }
        marks[idx.index()] = Mark::InProgress;
        path.push(idx);

        // Incoming edges originate at dependencies; petgraph iterates
        // neighbors most-recent-first, so restore declaration order.
        let mut deps: Vec<NodeIndex> =
            self.graph.neighbors_directed(idx, Direction::Incoming).collect();
        deps.reverse();
        for dep in deps {
            self.visit(dep, marks, order, path)?;
        }

        let _ = path.pop();
        marks[idx.index()] = Mark::Done;
        order.push(self.graph[idx].clone());
        Ok(())
    }

    fn cycle_error(&self, reentered: NodeIndex, path: &[NodeIndex]) -> CradleError {
        let start = path.iter().position(|&n| n == reentered).unwrap_or(0);
        let mut members: Vec<String> =
            path[start..].iter().map(|&n| self.graph[n].clone()).collect();
        members.push(self.graph[reentered].clone());
        CradleError::CyclicDependency { members }
    }
}
