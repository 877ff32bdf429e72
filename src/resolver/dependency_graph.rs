//! Fragment import graph.
//!
//! Nodes are fragments identified by canonical path; an edge `a → b` means `a` imports
//! `b`, so `b` must appear in the artifact before `a`. The graph provides cycle
//! detection with the full cycle path and a deterministic dependency-first ordering.

use anyhow::Result;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::core::WeaveError;

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently being visited (in the DFS stack).
    Gray,
    /// Node has been fully visited.
    Black,
}

/// Directed graph of fragment imports.
#[derive(Debug, Default)]
pub struct FragmentGraph {
    graph: DiGraph<PathBuf, ()>,
    node_map: HashMap<PathBuf, NodeIndex>,
    labels: HashMap<PathBuf, String>,
}

impl FragmentGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment with the label used in error messages.
    pub fn add_fragment(&mut self, path: &Path, label: impl Into<String>) -> NodeIndex {
        self.labels.insert(path.to_path_buf(), label.into());
        self.ensure_node(path)
    }

    fn ensure_node(&mut self, path: &Path) -> NodeIndex {
        if let Some(&index) = self.node_map.get(path) {
            index
        } else {
            let index = self.graph.add_node(path.to_path_buf());
            self.node_map.insert(path.to_path_buf(), index);
            index
        }
    }

    /// Record that `from` imports `to`.
    pub fn add_dependency(&mut self, from: &Path, to: &Path) {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);

        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    fn label(&self, index: NodeIndex) -> String {
        let path = &self.graph[index];
        self.labels.get(path).cloned().unwrap_or_else(|| path.display().to_string())
    }

    /// Direct imports of `index` in the order they were added.
    fn ordered_neighbors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self.graph.edges_directed(index, Direction::Outgoing).collect();
        edges.sort_by_key(|e| e.id().index());
        edges.into_iter().map(|e| e.target()).collect()
    }

    /// Fail with [`WeaveError::CyclicFragmentGraph`] naming the full cycle if one exists.
    pub fn detect_cycles(&self) -> Result<()> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|n| (n, Color::White)).collect();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            if matches!(colors.get(&node), Some(Color::White))
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                let chain = cycle.iter().map(|&n| self.label(n)).collect::<Vec<_>>().join(" → ");
                return Err(WeaveError::CyclicFragmentGraph {
                    chain,
                }
                .into());
            }
        }

        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for neighbor in self.ordered_neighbors(node) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let cycle_start = path.iter().position(|&n| n == neighbor).unwrap_or(0);
                    let mut cycle = path[cycle_start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// Every fragment reachable from `root`, dependencies first, `root` last.
    ///
    /// Siblings keep their import order, so the result only depends on the sources.
    pub fn topological_order(&self, root: &Path) -> Result<Vec<PathBuf>> {
        self.detect_cycles()?;

        let Some(&root_idx) = self.node_map.get(root) else {
            return Ok(Vec::new());
        };

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(root_idx, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(self.graph[node].clone());
                continue;
            }
            if !visited.insert(node) {
                continue;
            }
            stack.push((node, true));
            for neighbor in self.ordered_neighbors(node).into_iter().rev() {
                if !visited.contains(&neighbor) {
                    stack.push((neighbor, false));
                }
            }
        }
        Ok(order)
    }

    /// All fragments `path` depends on, directly or indirectly.
    pub fn get_transitive_deps(&self, path: &Path) -> HashSet<PathBuf> {
        let mut deps = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(&node_idx) = self.node_map.get(path) {
            queue.push_back(node_idx);
            while let Some(current) = queue.pop_front() {
                for neighbor in self.graph.neighbors(current) {
                    if deps.insert(self.graph[neighbor].clone()) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        deps
    }

    /// Number of fragments in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of import edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/repo/{name}.py"))
    }

    fn graph(edges: &[(&str, &str)]) -> FragmentGraph {
        let mut graph = FragmentGraph::new();
        for (from, to) in edges {
            graph.add_fragment(&p(from), format!("{from}.py"));
            graph.add_fragment(&p(to), format!("{to}.py"));
            graph.add_dependency(&p(from), &p(to));
        }
        graph
    }

    #[test]
    fn test_chain_order() {
        let graph = graph(&[("t", "b"), ("b", "c")]);
        assert_eq!(graph.topological_order(&p("t")).unwrap(), vec![p("c"), p("b"), p("t")]);
    }

    #[test]
    fn test_diamond_included_once_in_import_order() {
        // t -> util, t -> calc, util -> common, calc -> common
        let graph = graph(&[("t", "util"), ("t", "calc"), ("util", "common"), ("calc", "common")]);
        let order = graph.topological_order(&p("t")).unwrap();
        assert_eq!(order, vec![p("common"), p("util"), p("calc"), p("t")]);
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_cycle_reports_full_chain() {
        let graph = graph(&[("t", "a"), ("a", "b"), ("b", "a")]);
        let err = graph.topological_order(&p("t")).unwrap_err();
        match err.downcast_ref::<WeaveError>() {
            Some(WeaveError::CyclicFragmentGraph {
                chain,
            }) => assert_eq!(chain, "a.py → b.py → a.py"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_self_import_is_a_cycle() {
        let graph = graph(&[("t", "a"), ("a", "a")]);
        assert!(graph.detect_cycles().is_err());
    }

    #[test]
    fn test_transitive_deps() {
        let graph = graph(&[("t", "a"), ("a", "b"), ("c", "b")]);
        let deps = graph.get_transitive_deps(&p("t"));
        assert_eq!(deps, [p("a"), p("b")].into_iter().collect());
    }
}
