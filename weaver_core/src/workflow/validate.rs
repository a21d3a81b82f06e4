//! Structural validation of workflow graphs before execution.
//!
//! The validator never fails. It runs every applicable check and collects
//! the findings into a [`ValidationReport`], so callers see all problems of a
//! graph at once rather than fixing them one by one.

use crate::workflow::graph::{join_ids, Edge, EdgeId, Node, NodeId};
use crate::workflow::sort::{SortError, TopologicalSorter};
use std::collections::{HashMap, HashSet, VecDeque};

/// A single validation finding.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
    /// The same node identifier appears more than once.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// An edge names a node that is not in the node set.
    #[error("edge {edge} ({from} -> {to}) references missing node(s): {}", join_ids(missing))]
    InvalidEdgeReference {
        edge: EdgeId,
        from: NodeId,
        to: NodeId,
        missing: Vec<NodeId>,
    },

    /// The graph is not acyclic. Rendered with the sorter's own message.
    #[error("{0}")]
    Cyclic(SortError),

    /// Nodes not reachable from any start node.
    #[error("disconnected component: {} node(s) unreachable from any start node: {}", .0.len(), join_ids(.0))]
    Disconnected(Vec<NodeId>),

    /// A conditional node without both a true and a false branch.
    #[error("conditional node {node} must have at least 2 outgoing edges (found {found}, need ≥2)")]
    UnderBranchedConditional { node: NodeId, found: usize },

    /// A node with neither incoming nor outgoing edges. Warning only.
    #[error("node {0} is isolated (no incoming or outgoing edges)")]
    IsolatedNode(NodeId),
}

/// Result of validating a graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Returns true when no check produced an error. Warnings are ignored.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error findings, in check order.
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.errors
    }

    /// Error findings rendered as messages.
    pub fn errors(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Non-fatal findings.
    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }

    fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    fn warn(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }
}

/// Stateless graph validator.
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphValidator {
    sorter: TopologicalSorter,
}

impl GraphValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a graph and reports every violation found.
    ///
    /// Checks, in order:
    ///
    /// 1. Node identity and edge consistency. Any failure here skips the
    ///    remaining checks, which all assume a well-formed graph.
    /// 2. Acyclicity, delegated to the topological sorter.
    /// 3. Connectivity: breadth-first search from every in-degree-0 node.
    ///    Skipped when there is no start node at all.
    /// 4. Conditional branching: at least two outgoing edges.
    ///
    /// An empty graph is valid.
    pub fn validate(&self, nodes: &[Node], edges: &[Edge]) -> ValidationReport {
        let mut report = ValidationReport::default();

        if nodes.is_empty() && edges.is_empty() {
            return report;
        }

        if !self.check_integrity(nodes, edges, &mut report) {
            tracing::debug!(
                errors = report.errors.len(),
                "graph integrity check failed, skipping remaining checks"
            );
            return report;
        }

        if let Err(err) = self.sorter.sort(nodes, edges) {
            report.error(ValidationIssue::Cyclic(err));
        }

        let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::with_capacity(nodes.len());
        let mut in_degree: HashMap<NodeId, usize> = nodes.iter().map(|node| (node.id, 0)).collect();
        for edge in edges {
            successors.entry(edge.source).or_default().push(edge.target);
            *in_degree.entry(edge.target).or_default() += 1;
        }

        self.check_connectivity(nodes, &successors, &in_degree, &mut report);

        for node in nodes.iter().filter(|node| node.kind.is_conditional()) {
            let found = successors.get(&node.id).map_or(0, Vec::len);
            if found < 2 {
                report.error(ValidationIssue::UnderBranchedConditional {
                    node: node.id,
                    found,
                });
            }
        }

        if nodes.len() > 1 {
            for node in nodes {
                let outgoing = successors.get(&node.id).map_or(0, Vec::len);
                if outgoing == 0 && in_degree[&node.id] == 0 {
                    report.warn(ValidationIssue::IsolatedNode(node.id));
                }
            }
        }

        tracing::debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "graph validated"
        );

        report
    }

    /// Returns false if any duplicate node or dangling edge was found.
    fn check_integrity(&self, nodes: &[Node], edges: &[Edge], report: &mut ValidationReport) -> bool {
        let mut known: HashSet<NodeId> = HashSet::with_capacity(nodes.len());
        let mut sound = true;

        for node in nodes {
            if !known.insert(node.id) {
                report.error(ValidationIssue::DuplicateNode(node.id));
                sound = false;
            }
        }

        for edge in edges {
            let mut missing = Vec::new();
            if !known.contains(&edge.source) {
                missing.push(edge.source);
            }
            if !known.contains(&edge.target) && edge.target != edge.source {
                missing.push(edge.target);
            }

            if !missing.is_empty() {
                report.error(ValidationIssue::InvalidEdgeReference {
                    edge: edge.id,
                    from: edge.source,
                    to: edge.target,
                    missing,
                });
                sound = false;
            }
        }

        sound
    }

    fn check_connectivity(
        &self,
        nodes: &[Node],
        successors: &HashMap<NodeId, Vec<NodeId>>,
        in_degree: &HashMap<NodeId, usize>,
        report: &mut ValidationReport,
    ) {
        let starts: Vec<NodeId> = nodes
            .iter()
            .map(|node| node.id)
            .filter(|id| in_degree[id] == 0)
            .collect();

        // No start node means the cycle check has already failed.
        if starts.is_empty() {
            return;
        }

        let mut visited: HashSet<NodeId> = starts.iter().copied().collect();
        let mut queue: VecDeque<NodeId> = starts.into_iter().collect();

        while let Some(id) = queue.pop_front() {
            for next in successors.get(&id).into_iter().flatten() {
                if visited.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }

        let unvisited: Vec<NodeId> = nodes
            .iter()
            .map(|node| node.id)
            .filter(|id| !visited.contains(id))
            .collect();

        if !unvisited.is_empty() {
            report.error(ValidationIssue::Disconnected(unvisited));
        }
    }
}
