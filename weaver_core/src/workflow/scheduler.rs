//! Live execution frontier for a single workflow run.
//!
//! [`ActiveNodeQueue`] is Kahn's algorithm turned inside out: instead of
//! producing a complete order up front it keeps the in-degree bookkeeping
//! alive, hands out every currently runnable node as one batch, and releases
//! dependents as completions are reported. All nodes in a batch are mutually
//! independent and may run in parallel.

use crate::workflow::graph::{Edge, Node, NodeId};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, VecDeque};

/// Error returned by the scheduler.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The node is not part of the initialized graph.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
}

/// Per-run scheduling state.
///
/// Owned by exactly one run at a time; [`initialize`](Self::initialize)
/// discards everything from a previous run.
#[derive(Clone, Debug, Default)]
pub struct ActiveNodeQueue {
    nodes: IndexMap<NodeId, Node>,
    successors: HashMap<NodeId, Vec<NodeId>>,
    in_degree: HashMap<NodeId, usize>,
    ready: VecDeque<NodeId>,
    dispatched: IndexSet<NodeId>,
    completed: IndexSet<NodeId>,
}

impl ActiveNodeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the queue for a new run over the given graph.
    ///
    /// In-degree-0 nodes are enqueued in node input order.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownNode`] if an edge endpoint is not in the
    /// node set. The queue is left empty in that case.
    pub fn initialize(&mut self, nodes: &[Node], edges: &[Edge]) -> Result<(), SchedulerError> {
        self.clear();

        let nodes: IndexMap<NodeId, Node> = nodes.iter().map(|node| (node.id, node.clone())).collect();
        for edge in edges {
            for endpoint in [edge.source, edge.target] {
                if !nodes.contains_key(&endpoint) {
                    return Err(SchedulerError::UnknownNode(endpoint));
                }
            }
        }

        self.in_degree = nodes.keys().map(|id| (*id, 0)).collect();
        for edge in edges {
            self.successors.entry(edge.source).or_default().push(edge.target);
            *self.in_degree.entry(edge.target).or_default() += 1;
        }

        self.ready = nodes
            .keys()
            .filter(|id| self.in_degree[*id] == 0)
            .copied()
            .collect();
        self.nodes = nodes;

        tracing::debug!(
            nodes = self.nodes.len(),
            edges = edges.len(),
            ready = self.ready.len(),
            "scheduler initialized"
        );

        Ok(())
    }

    /// Returns every currently runnable node and clears the ready queue.
    ///
    /// Each node is handed out in exactly one batch per run. An empty result
    /// while [`has_more_work`](Self::has_more_work) is true means nothing can
    /// progress until an in-flight node completes, or the graph is stuck.
    pub fn get_ready_nodes(&mut self) -> Vec<Node> {
        let mut batch = Vec::with_capacity(self.ready.len());
        while let Some(id) = self.ready.pop_front() {
            if let Some(node) = self.nodes.get(&id) {
                self.dispatched.insert(id);
                batch.push(node.clone());
            }
        }
        batch
    }

    /// Records a completion and releases dependents.
    ///
    /// Returns the nodes that became ready because of this completion.
    /// Completing an already completed node is a no-op.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownNode`] if the node was not part of the
    /// initialized graph.
    pub fn mark_node_completed(&mut self, id: NodeId) -> Result<Vec<NodeId>, SchedulerError> {
        if !self.nodes.contains_key(&id) {
            return Err(SchedulerError::UnknownNode(id));
        }

        if self.completed.contains(&id) {
            tracing::warn!(node_id = %id, "node already completed, ignoring");
            return Ok(Vec::new());
        }

        self.ready.retain(|queued| *queued != id);
        self.dispatched.shift_remove(&id);
        self.completed.insert(id);

        let mut released = Vec::new();
        if let Some(successors) = self.successors.get(&id) {
            for next in successors {
                let Some(degree) = self.in_degree.get_mut(next) else {
                    continue;
                };
                if *degree == 0 {
                    continue;
                }
                *degree -= 1;
                if *degree == 0 && !self.completed.contains(next) {
                    self.ready.push_back(*next);
                    released.push(*next);
                }
            }
        }

        Ok(released)
    }

    /// True while the ready queue is non-empty or any node is incomplete.
    pub fn has_more_work(&self) -> bool {
        !self.ready.is_empty() || self.completed.len() < self.nodes.len()
    }

    /// Nodes still waiting on dependencies. Used for deadlock diagnostics.
    pub fn get_remaining_nodes(&self) -> Vec<Node> {
        self.nodes
            .values()
            .filter(|node| self.in_degree[&node.id] > 0 && !self.completed.contains(&node.id))
            .cloned()
            .collect()
    }

    /// Nodes handed out in a batch but not yet completed.
    pub fn in_flight_nodes(&self) -> Vec<Node> {
        self.dispatched
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .cloned()
            .collect()
    }

    /// Returns true if the node has been marked completed in this run.
    pub fn is_completed(&self, id: &NodeId) -> bool {
        self.completed.contains(id)
    }

    /// Number of completed nodes in this run.
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Number of nodes in the initialized graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Computes the batch sequence a run would see if every node of a batch
    /// completed before the next batch is requested.
    ///
    /// Nodes on or downstream of a cycle never appear in any batch.
    pub fn plan_batches(nodes: &[Node], edges: &[Edge]) -> Result<Vec<Vec<NodeId>>, SchedulerError> {
        let mut queue = Self::new();
        queue.initialize(nodes, edges)?;

        let mut batches = Vec::new();
        loop {
            let batch: Vec<NodeId> = queue.get_ready_nodes().into_iter().map(|node| node.id).collect();
            if batch.is_empty() {
                break;
            }
            for id in &batch {
                queue.mark_node_completed(*id)?;
            }
            batches.push(batch);
        }

        Ok(batches)
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.successors.clear();
        self.in_degree.clear();
        self.ready.clear();
        self.dispatched.clear();
        self.completed.clear();
    }
}
