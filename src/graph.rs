//! Dependency graph module.
//!
//! Provides `DependencyGraph`, the directed graph of "is read by" edges
//! between calculation nodes and their inputs. Edges go from a dependency
//! to its dependent, so invalidation follows outgoing edges and
//! recomputation follows a topological order.

use crate::error::StatError;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// A directed graph of dependencies between keys.
///
/// Nodes can be removed without invalidating the indices of other nodes.
///
/// # Examples
///
/// ```rust
/// use statgraph::graph::DependencyGraph;
///
/// let mut graph = DependencyGraph::new();
///
/// // "Life" is read by "Life.Total"
/// graph.set_dependencies(&"Life.Total", ["Life"]);
///
/// let dirty = graph.transitive_dependents(["Life"]);
/// assert!(dirty.contains("Life.Total"));
/// ```
pub struct DependencyGraph<K> {
    graph: StableDiGraph<K, ()>,
    node_map: HashMap<K, NodeIndex>,
}

impl<K> DependencyGraph<K>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Add a node to the graph if it doesn't exist.
    pub fn add_node(&mut self, key: K) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&key) {
            idx
        } else {
            let idx = self.graph.add_node(key.clone());
            self.node_map.insert(key, idx);
            idx
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.node_map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// Replace everything `dependent` reads with `dependencies`.
    ///
    /// Missing nodes are created. Returns the keys `dependent` no longer
    /// reads.
    pub fn set_dependencies(
        &mut self,
        dependent: &K,
        dependencies: impl IntoIterator<Item = K>,
    ) -> Vec<K> {
        let dependent_idx = self.add_node(dependent.clone());
        let stale: Vec<_> = self
            .graph
            .edges_directed(dependent_idx, Direction::Incoming)
            .map(|edge| (edge.id(), edge.source()))
            .collect();
        for (edge, _) in &stale {
            self.graph.remove_edge(*edge);
        }

        let mut seen = HashSet::new();
        for dependency in dependencies {
            let idx = self.add_node(dependency);
            if seen.insert(idx) {
                self.graph.add_edge(idx, dependent_idx, ());
            }
        }

        stale
            .into_iter()
            .filter(|(_, source)| !seen.contains(source))
            .map(|(_, source)| self.graph[source].clone())
            .collect()
    }

    /// Keys that directly read `key`.
    pub fn dependents(&self, key: &K) -> Vec<K> {
        self.neighbors(key, Direction::Outgoing)
    }

    /// Keys that `key` directly reads.
    pub fn dependencies(&self, key: &K) -> Vec<K> {
        self.neighbors(key, Direction::Incoming)
    }

    pub fn has_dependents(&self, key: &K) -> bool {
        self.node_map.get(key).map_or(false, |&idx| {
            self.graph
                .neighbors_directed(idx, Direction::Outgoing)
                .next()
                .is_some()
        })
    }

    fn neighbors(&self, key: &K, direction: Direction) -> Vec<K> {
        match self.node_map.get(key) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, direction)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every key reachable from `roots` along outgoing edges, roots excluded
    /// unless they are reachable from another root.
    pub fn transitive_dependents(&self, roots: impl IntoIterator<Item = K>) -> HashSet<K> {
        let mut visited = HashSet::new();
        let mut stack: Vec<NodeIndex> = roots
            .into_iter()
            .filter_map(|key| self.node_map.get(&key).copied())
            .collect();

        while let Some(idx) = stack.pop() {
            for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if visited.insert(neighbor) {
                    stack.push(neighbor);
                }
            }
        }

        visited.into_iter().map(|idx| self.graph[idx].clone()).collect()
    }

    /// Remove a key and all its edges.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.node_map.remove(key) {
            Some(idx) => {
                self.graph.remove_node(idx);
                true
            }
            None => false,
        }
    }

    /// The given keys ordered so that dependencies come before dependents.
    ///
    /// Only edges between the given keys are followed, so the cost does not
    /// depend on the size of the rest of the graph. Returns
    /// `StatError::Cycle` if the keys depend on each other in a cycle.
    pub fn topological_order(&self, keys: &HashSet<K>) -> Result<Vec<K>, StatError> {
        let members: HashSet<NodeIndex> = keys
            .iter()
            .filter_map(|key| self.node_map.get(key).copied())
            .collect();
        let mut order = Vec::with_capacity(members.len());
        let mut done = HashSet::new();
        // keys being expanded, from dependent down to dependency
        let mut trail: Vec<NodeIndex> = Vec::new();

        for &start in &members {
            if done.contains(&start) {
                continue;
            }
            let mut stack = vec![(start, false)];
            while let Some((idx, expanded)) = stack.pop() {
                if expanded {
                    trail.pop();
                    if done.insert(idx) {
                        order.push(self.graph[idx].clone());
                    }
                    continue;
                }
                if done.contains(&idx) {
                    continue;
                }
                trail.push(idx);
                stack.push((idx, true));
                for dependency in self.graph.neighbors_directed(idx, Direction::Incoming) {
                    if !members.contains(&dependency) || done.contains(&dependency) {
                        continue;
                    }
                    if let Some(position) = trail.iter().position(|&t| t == dependency) {
                        let path = trail[position..]
                            .iter()
                            .chain(std::iter::once(&dependency))
                            .map(|&t| self.graph[t].to_string())
                            .collect();
                        return Err(StatError::Cycle { path });
                    }
                    stack.push((dependency, false));
                }
            }
        }
        Ok(order)
    }
}

impl<K> Default for DependencyGraph<K>
where
    K: Clone + Eq + Hash + fmt::Display,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> DependencyGraph<&'static str> {
        // total <- subtotal <- base, total <- override
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(&"total", ["subtotal", "override"]);
        graph.set_dependencies(&"subtotal", ["base"]);
        graph
    }

    #[test]
    fn test_graph_add_nodes() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a");
        graph.add_node("a");
        graph.add_node("b");
        assert_eq!(graph.len(), 2);
        assert!(graph.contains(&"a"));
        assert!(!graph.contains(&"c"));
    }

    #[test]
    fn test_dependents_and_dependencies() {
        let graph = graph();
        assert_eq!(graph.dependents(&"base"), vec!["subtotal"]);
        let mut deps = graph.dependencies(&"total");
        deps.sort();
        assert_eq!(deps, vec!["override", "subtotal"]);
        assert!(graph.has_dependents(&"subtotal"));
        assert!(!graph.has_dependents(&"total"));
    }

    #[test]
    fn test_set_dependencies_replaces_edges() {
        let mut graph = graph();
        let dropped = graph.set_dependencies(&"total", ["override"]);
        assert_eq!(dropped, vec!["subtotal"]);
        assert!(graph.dependents(&"subtotal").is_empty());
        assert!(graph.contains(&"subtotal"));
    }

    #[test]
    fn test_duplicate_dependencies_collapse() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(&"x", ["y", "y"]);
        assert_eq!(graph.dependents(&"y"), vec!["x"]);
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = graph();
        let dirty = graph.transitive_dependents(["base"]);
        assert_eq!(dirty.len(), 2);
        assert!(dirty.contains("subtotal"));
        assert!(dirty.contains("total"));
        assert!(!dirty.contains("base"));
    }

    #[test]
    fn test_topological_order() {
        let graph = graph();
        let keys: HashSet<_> = ["total", "subtotal", "base"].into_iter().collect();
        let order = graph.topological_order(&keys).unwrap();
        assert_eq!(order.len(), 3);
        let pos = |k: &str| order.iter().position(|x| *x == k).unwrap();
        assert!(pos("base") < pos("subtotal"));
        assert!(pos("subtotal") < pos("total"));
    }

    #[test]
    fn test_topological_order_ignores_keys_outside_the_subset() {
        // unrelated <- other, only the subset is ordered
        let mut graph = graph();
        graph.set_dependencies(&"other", ["unrelated"]);
        let keys: HashSet<_> = ["total", "base"].into_iter().collect();
        let order = graph.topological_order(&keys).unwrap();
        assert_eq!(order.len(), 2);
        assert!(!order.contains(&"other"));
    }

    #[test]
    fn test_topological_order_only_reports_cycles_within_the_subset() {
        let mut graph = graph();
        graph.set_dependencies(&"a", ["b"]);
        graph.set_dependencies(&"b", ["a"]);
        let keys: HashSet<_> = ["total", "subtotal"].into_iter().collect();
        assert!(graph.topological_order(&keys).is_ok());

        let keys: HashSet<_> = ["a", "b"].into_iter().collect();
        let err = graph.topological_order(&keys).unwrap_err();
        assert!(matches!(err, StatError::Cycle { path } if path.len() == 3));
    }

    #[test]
    fn test_topological_order_detects_cycles() {
        let mut graph = graph();
        graph.set_dependencies(&"base", ["total"]);
        let keys: HashSet<_> = ["total", "subtotal", "base"].into_iter().collect();
        assert!(matches!(
            graph.topological_order(&keys),
            Err(StatError::Cycle { .. })
        ));
    }

    #[test]
    fn test_remove() {
        let mut graph = graph();
        assert!(graph.remove(&"subtotal"));
        assert!(!graph.remove(&"subtotal"));
        assert!(graph.dependents(&"base").is_empty());
        assert!(graph.transitive_dependents(["base"]).is_empty());
    }
}
