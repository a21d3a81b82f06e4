//! Common test utilities for weaver-core integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use weaver_core::workflow::graph::{ConditionalConfig, TriggerConfig};
use weaver_core::{BoxError, Edge, Node, NodeId, NodeKind, NodeOutput};

/// Creates a trigger node with the given name.
pub fn task(name: &str) -> Node {
    Node::new(NodeKind::Trigger(TriggerConfig::default())).named(name)
}

/// Creates a conditional node with the given name.
pub fn conditional(name: &str) -> Node {
    Node::new(NodeKind::Conditional(ConditionalConfig {
        condition: format!("{} == true", name),
    }))
    .named(name)
}

/// Creates an edge `from -> to`.
pub fn edge(from: &Node, to: &Node) -> Edge {
    Edge::new(from.id, to.id)
}

/// Deterministic executor that answers each node with its label and
/// records every batch it was handed.
pub struct RecordingExecutor {
    batches: Rc<RefCell<Vec<Vec<NodeId>>>>,
    fail_on_batch: Option<usize>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            batches: Rc::new(RefCell::new(Vec::new())),
            fail_on_batch: None,
        }
    }

    /// Fails the batch with the given 1-based index.
    pub fn failing_on(batch: usize) -> Self {
        Self {
            fail_on_batch: Some(batch),
            ..Self::new()
        }
    }

    /// Shared handle to the recorded batches.
    pub fn batches(&self) -> Rc<RefCell<Vec<Vec<NodeId>>>> {
        Rc::clone(&self.batches)
    }

    pub fn call(&mut self, batch: &[Node]) -> Result<Vec<NodeOutput>, BoxError> {
        let ids: Vec<NodeId> = batch.iter().map(|node| node.id).collect();
        self.batches.borrow_mut().push(ids);
        let index = self.batches.borrow().len();

        if self.fail_on_batch == Some(index) {
            return Err(format!("batch {} exploded", index).into());
        }

        Ok(batch
            .iter()
            .map(|node| NodeOutput::new(node.id, node.label()))
            .collect())
    }
}

impl weaver_core::NodeExecutor for RecordingExecutor {
    fn execute_batch(&mut self, batch: &[Node]) -> Result<Vec<NodeOutput>, BoxError> {
        self.call(batch)
    }
}
