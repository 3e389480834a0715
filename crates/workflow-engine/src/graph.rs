//! The built workflow graph
//!
//! Nodes keep their declaration order. Edges run from a declared input
//! connection's source to the node that declares it and remember the input
//! port they feed. Nodes absorbed into a composite operator are
//! non-participating: they own an operator but are never scheduled, and the
//! engine ignores edges that touch them.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::Port;
use crate::error::{Result, WorkflowError};
use crate::kind::NodeKind;
use crate::operator::{OperatorId, OperatorTable};

/// Output port followed when a Conditional node evaluates true
pub const BRANCH_TRUE_PORT: &str = "output_1";
/// Output port followed when a Conditional node evaluates false
pub const BRANCH_FALSE_PORT: &str = "output_2";

/// A node entry
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub operator: OperatorId,
    /// Declared output connections; used by branch nodes
    pub outputs: Vec<Port>,
    /// Snapshot of the node's original arguments, for display only
    pub source: Map<String, Value>,
}

impl GraphNode {
    /// Targets wired to the named output port, in declaration order
    pub fn output_targets(&self, port: &str) -> Vec<&str> {
        self.outputs
            .iter()
            .filter(|p| p.name == port)
            .flat_map(|p| p.connections.iter().map(|c| c.node.as_str()))
            .collect()
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    /// Input port on `target` the edge feeds
    pub input_port: String,
}

/// Nodes, edges, the non-participating set and the operator arena
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    non_participating: HashSet<String>,
    operators: OperatorTable,
}

impl Graph {
    pub(crate) fn new(operators: OperatorTable) -> Self {
        Self {
            operators,
            ..Self::default()
        }
    }

    pub(crate) fn add_node(&mut self, node: GraphNode) {
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    pub(crate) fn add_edge(&mut self, edge: GraphEdge) {
        self.edges.push(edge);
    }

    pub(crate) fn mark_non_participating(&mut self, ids: impl IntoIterator<Item = String>) {
        self.non_participating.extend(ids);
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    pub fn non_participating(&self) -> &HashSet<String> {
        &self.non_participating
    }

    pub fn is_participating(&self, id: &str) -> bool {
        self.index.contains_key(id) && !self.non_participating.contains(id)
    }

    /// Participating nodes in declaration order
    pub fn participating(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes
            .iter()
            .filter(move |n| !self.non_participating.contains(&n.id))
    }

    fn participating_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges
            .iter()
            .filter(move |e| self.is_participating(&e.source) && self.is_participating(&e.target))
    }

    /// Distinct participating predecessors, in edge-declaration order
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.participating_edges()
            .filter(|e| e.target == id)
            .map(|e| e.source.as_str())
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Distinct participating successors, in edge-declaration order
    pub fn successors(&self, id: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.participating_edges()
            .filter(|e| e.source == id)
            .map(|e| e.target.as_str())
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Participating successors on the taken side of a branch node
    pub fn branch_successors(&self, id: &str, taken: bool) -> Vec<&str> {
        let port = if taken {
            BRANCH_TRUE_PORT
        } else {
            BRANCH_FALSE_PORT
        };
        self.node(id)
            .map(|node| {
                let mut seen = HashSet::new();
                node.output_targets(port)
                    .into_iter()
                    .filter(|t| self.is_participating(t) && seen.insert(*t))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Participating nodes without participating predecessors
    pub fn roots(&self) -> Vec<&GraphNode> {
        let targets: HashSet<&str> = self
            .participating_edges()
            .map(|e| e.target.as_str())
            .collect();
        self.participating()
            .filter(|n| !targets.contains(n.id.as_str()))
            .collect()
    }

    /// Detect cycles over the participating subgraph (Kahn's algorithm)
    ///
    /// Returns the ids left unsorted, which lie on or behind a cycle.
    pub fn detect_cycles(&self) -> Result<()> {
        let mut in_degree: HashMap<&str, usize> =
            self.participating().map(|n| (n.id.as_str(), 0)).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in self.participating_edges() {
            *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut sorted = 0;

        while let Some(id) = queue.pop_front() {
            sorted += 1;
            for &next in adjacency.get(id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(d) = in_degree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if sorted == in_degree.len() {
            return Ok(());
        }
        let mut remaining: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        remaining.sort();
        Err(WorkflowError::CycleDetected(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Connection;

    fn graph(ids: &[&str], edges: &[(&str, &str)]) -> Graph {
        let mut g = Graph::default();
        for (i, id) in ids.iter().enumerate() {
            g.add_node(GraphNode {
                id: id.to_string(),
                kind: NodeKind::Placeholder,
                operator: OperatorId::new(i),
                outputs: Vec::new(),
                source: Map::new(),
            });
        }
        for (s, t) in edges {
            g.add_edge(GraphEdge {
                source: s.to_string(),
                target: t.to_string(),
                input_port: "input_1".to_string(),
            });
        }
        g
    }

    #[test]
    fn test_acyclic_graph_passes() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("a", "c")]);
        assert!(g.detect_cycles().is_ok());
        assert_eq!(g.predecessors("c"), vec!["b", "a"]);
        assert_eq!(g.successors("a"), vec!["b", "c"]);
        let roots: Vec<_> = g.roots().iter().map(|n| n.id.clone()).collect();
        assert_eq!(roots, vec!["a"]);
    }

    #[test]
    fn test_cycle_detected() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "b")]);
        let err = g.detect_cycles().unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(ids) if ids == vec!["b", "c"]));
    }

    #[test]
    fn test_cycle_through_non_participating_node_ignored() {
        let mut g = graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
        g.mark_non_participating(vec!["b".to_string()]);
        assert!(g.detect_cycles().is_ok());
        assert!(g.predecessors("a").is_empty());
        assert!(!g.is_participating("b"));
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let g = graph(&["a", "b"], &[("a", "b"), ("a", "b")]);
        assert_eq!(g.predecessors("b"), vec!["a"]);
    }

    #[test]
    fn test_branch_successors_follow_ports() {
        let mut g = graph(&["if", "yes", "no"], &[("if", "yes"), ("if", "no")]);
        g.nodes[0].outputs = vec![
            Port {
                name: BRANCH_TRUE_PORT.to_string(),
                connections: vec![Connection {
                    node: "yes".to_string(),
                    port: "input_1".to_string(),
                }],
            },
            Port {
                name: BRANCH_FALSE_PORT.to_string(),
                connections: vec![Connection {
                    node: "no".to_string(),
                    port: "input_1".to_string(),
                }],
            },
        ];
        assert_eq!(g.branch_successors("if", true), vec!["yes"]);
        assert_eq!(g.branch_successors("if", false), vec!["no"]);
        assert!(g.branch_successors("missing", true).is_empty());
    }
}
