//! Topological ordering of workflow graphs.
//!
//! [`TopologicalSorter`] runs Kahn's algorithm over the node and edge slices.
//! When the graph contains a cycle the error names every node that could not
//! be ordered, and petgraph's Tarjan SCC pass separates the actual cycle
//! members from nodes that are merely downstream of one.

use crate::workflow::graph::{join_ids, Edge, EdgeId, Node, NodeId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, VecDeque};

/// Error returned by [`TopologicalSorter::sort`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SortError {
    /// The same node identifier appears more than once in the node set.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// An edge endpoint is not in the node set.
    #[error("edge {edge} references unknown node {node}")]
    InvalidEdgeReference { edge: EdgeId, node: NodeId },

    /// Some nodes could not be ordered because they sit on, or downstream
    /// of, a cycle.
    #[error("cycle detected: {} node(s) could not be ordered: {}", unreachable.len(), join_ids(unreachable))]
    CycleDetected {
        /// Every unprocessed node, in node input order.
        unreachable: Vec<NodeId>,
        /// Strongly connected components of size > 1 and self loops.
        cycles: Vec<Vec<NodeId>>,
    },
}

/// Stateless topological sorter.
#[derive(Clone, Copy, Debug, Default)]
pub struct TopologicalSorter;

impl TopologicalSorter {
    pub fn new() -> Self {
        Self
    }

    /// Returns the nodes in a dependency-respecting order.
    ///
    /// For every edge `(u, v)`, `u` appears before `v` in the result. Among
    /// nodes with no ordering constraint between them, no particular order
    /// is guaranteed beyond the current FIFO behavior (in-degree-0 nodes are
    /// seeded in input order).
    ///
    /// # Errors
    ///
    /// - [`SortError::DuplicateNode`] if a node id is repeated
    /// - [`SortError::InvalidEdgeReference`] if an edge endpoint is unknown,
    ///   checked before any traversal
    /// - [`SortError::CycleDetected`] if the graph is not acyclic
    pub fn sort<'a>(&self, nodes: &'a [Node], edges: &[Edge]) -> Result<Vec<&'a Node>, SortError> {
        let mut index: HashMap<NodeId, usize> = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id, position).is_some() {
                return Err(SortError::DuplicateNode(node.id));
            }
        }

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut in_degree: Vec<usize> = vec![0; nodes.len()];

        for edge in edges {
            let source = resolve(&index, edge, edge.source)?;
            let target = resolve(&index, edge, edge.target)?;
            successors[source].push(target);
            in_degree[target] += 1;
        }

        let mut queue: VecDeque<usize> = (0..nodes.len())
            .filter(|&position| in_degree[position] == 0)
            .collect();
        let mut emitted = vec![false; nodes.len()];
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(position) = queue.pop_front() {
            emitted[position] = true;
            order.push(&nodes[position]);

            for &next in &successors[position] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() < nodes.len() {
            let remaining: Vec<usize> = (0..nodes.len()).filter(|&p| !emitted[p]).collect();
            let cycles = find_cycles(nodes, &remaining, &successors);
            let unreachable: Vec<NodeId> = remaining.iter().map(|&p| nodes[p].id).collect();

            tracing::debug!(
                unordered = unreachable.len(),
                cycles = cycles.len(),
                "topological sort found a cycle"
            );

            return Err(SortError::CycleDetected {
                unreachable,
                cycles,
            });
        }

        Ok(order)
    }

    /// Returns true if the graph can be ordered.
    pub fn is_acyclic(&self, nodes: &[Node], edges: &[Edge]) -> bool {
        self.sort(nodes, edges).is_ok()
    }
}

fn resolve(index: &HashMap<NodeId, usize>, edge: &Edge, node: NodeId) -> Result<usize, SortError> {
    index
        .get(&node)
        .copied()
        .ok_or(SortError::InvalidEdgeReference {
            edge: edge.id,
            node,
        })
}

/// Runs Tarjan's SCC over the subgraph induced by the unprocessed nodes.
///
/// Members of each cycle are listed in node input order and cycles are
/// ordered by their first member.
fn find_cycles(nodes: &[Node], remaining: &[usize], successors: &[Vec<usize>]) -> Vec<Vec<NodeId>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(remaining.len(), 0);
    let mut graph_index: HashMap<usize, NodeIndex> = HashMap::with_capacity(remaining.len());

    for &position in remaining {
        graph_index.insert(position, graph.add_node(position));
    }

    for &position in remaining {
        let from = graph_index[&position];
        for next in &successors[position] {
            if let Some(&to) = graph_index.get(next) {
                graph.add_edge(from, to, ());
            }
        }
    }

    let mut cycles: Vec<Vec<usize>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.contains_edge(component[0], component[0])
        })
        .map(|component| {
            let mut members: Vec<usize> = component.into_iter().map(|idx| graph[idx]).collect();
            members.sort_unstable();
            members
        })
        .collect();
    cycles.sort_by_key(|members| members[0]);

    cycles
        .into_iter()
        .map(|members| members.into_iter().map(|p| nodes[p].id).collect())
        .collect()
}
