//! Explicit dependency graph shared by the verification plan and the
//! release stage ordering.
//!
//! An edge `A → B` means "B depends on A": A must complete before B may run.
//! Cycles are rejected when an edge is added, and the graph is rolled back
//! to its previous state.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::domain::error::{MatrixError, Result};

/// Directed acyclic graph over string node ids.
///
/// Ordered collections keep every traversal deterministic.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// `dependency → {dependent, ...}`
    downstream: BTreeMap<String, BTreeSet<String>>,
    /// `dependent → {dependency, ...}`
    upstream: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Idempotent.
    pub fn add_node(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.downstream.entry(id.clone()).or_default();
        self.upstream.entry(id).or_default();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.downstream.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.downstream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downstream.is_empty()
    }

    /// `dependent` depends on `dependency`. Both nodes must exist.
    pub fn add_dependency(&mut self, dependency: &str, dependent: &str) -> Result<()> {
        for id in [dependency, dependent] {
            if !self.contains(id) {
                return Err(MatrixError::UnknownNode {
                    node: id.to_string(),
                });
            }
        }

        let inserted = self
            .downstream
            .entry(dependency.to_string())
            .or_default()
            .insert(dependent.to_string());
        self.upstream
            .entry(dependent.to_string())
            .or_default()
            .insert(dependency.to_string());

        if let Some(cycle) = self.find_cycle_through(dependent) {
            if inserted {
                if let Some(set) = self.downstream.get_mut(dependency) {
                    set.remove(dependent);
                }
                if let Some(set) = self.upstream.get_mut(dependent) {
                    set.remove(dependency);
                }
            }
            return Err(MatrixError::DependencyCycle { nodes: cycle });
        }
        Ok(())
    }

    /// Nodes with dependencies first (Kahn's algorithm, ties by id).
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .upstream
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut sorted = Vec::with_capacity(self.len());
        while let Some(id) = queue.pop_front() {
            sorted.push(id.to_string());
            for dependent in self.downstream.get(id).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        if sorted.len() != self.len() {
            let stuck = in_degree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            return Err(MatrixError::DependencyCycle { nodes: stuck });
        }
        Ok(sorted)
    }

    /// Direct dependencies of `id`.
    pub fn dependencies_of(&self, id: &str) -> Result<Vec<&str>> {
        self.upstream
            .get(id)
            .map(|set| set.iter().map(String::as_str).collect())
            .ok_or_else(|| MatrixError::UnknownNode {
                node: id.to_string(),
            })
    }

    /// Direct dependents of `id`.
    pub fn dependents_of(&self, id: &str) -> Result<Vec<&str>> {
        self.downstream
            .get(id)
            .map(|set| set.iter().map(String::as_str).collect())
            .ok_or_else(|| MatrixError::UnknownNode {
                node: id.to_string(),
            })
    }

    fn find_cycle_through(&self, start: &str) -> Option<Vec<String>> {
        let mut visited = BTreeSet::new();
        let mut path = Vec::new();
        if self.dfs_cycle(start, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn dfs_cycle(&self, node: &str, visited: &mut BTreeSet<String>, path: &mut Vec<String>) -> bool {
        if path.iter().any(|p| p == node) {
            path.push(node.to_string());
            return true;
        }
        if !visited.insert(node.to_string()) {
            return false;
        }
        path.push(node.to_string());
        for dependent in self.downstream.get(node).into_iter().flatten() {
            if self.dfs_cycle(dependent, visited, path) {
                return true;
            }
        }
        path.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for id in ["publish", "sign", "tag"] {
            g.add_node(id);
        }
        g.add_dependency("publish", "sign").unwrap();
        g.add_dependency("sign", "tag").unwrap();
        g
    }

    #[test]
    fn test_topological_order() {
        assert_eq!(chain().topological_order().unwrap(), vec!["publish", "sign", "tag"]);
    }

    #[test]
    fn test_cycle_rejected_and_rolled_back() {
        let mut g = chain();
        let err = g.add_dependency("tag", "publish").unwrap_err();
        assert!(matches!(err, MatrixError::DependencyCycle { .. }));
        assert!(g.dependencies_of("publish").unwrap().is_empty());
        assert!(g.topological_order().is_ok());
    }

    #[test]
    fn test_self_edge_is_cycle() {
        let mut g = DependencyGraph::new();
        g.add_node("a");
        assert!(g.add_dependency("a", "a").is_err());
        assert!(g.dependents_of("a").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_node() {
        let mut g = DependencyGraph::new();
        g.add_node("a");
        assert!(matches!(
            g.add_dependency("a", "b"),
            Err(MatrixError::UnknownNode { ref node }) if node == "b"
        ));
    }

    #[test]
    fn test_fan_in() {
        let mut g = DependencyGraph::new();
        g.add_node("check");
        for t in ["t2", "t1", "t3"] {
            g.add_node(t);
            g.add_dependency(t, "check").unwrap();
        }
        assert_eq!(g.dependencies_of("check").unwrap(), vec!["t1", "t2", "t3"]);
        assert_eq!(g.topological_order().unwrap().last().unwrap(), "check");
    }
}
