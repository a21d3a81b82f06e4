//! Workflow state machine.
//!
//! [`WorkflowState`] is an immutable snapshot. Every change goes through
//! [`StateTransition::apply`], which returns a new snapshot and leaves the
//! input untouched, so any intermediate state can be kept, compared or
//! serialized for inspection.
//!
//! ```text
//! Initializing --NodesReady--> ExecutingNodes --AllNodesCompleted--> Completed
//!                               |    ^
//!                               +----+ NodesReady / NodeCompleted
//!
//! any non-terminal phase --WorkflowFailed--> Failed
//! ```

use crate::workflow::graph::{join_ids, NodeId};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle phase of a workflow run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowPhase {
    Initializing,
    ExecutingNodes,
    Completed,
    Failed,
}

impl WorkflowPhase {
    /// Completed and Failed accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowPhase::Completed | WorkflowPhase::Failed)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowPhase::Initializing => "INITIALIZING",
            WorkflowPhase::ExecutingNodes => "EXECUTING_NODES",
            WorkflowPhase::Completed => "COMPLETED",
            WorkflowPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Immutable snapshot of a workflow run.
///
/// Equality ignores the insertion order of the node sets and the data
/// registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    phase: WorkflowPhase,
    active_nodes: IndexSet<NodeId>,
    completed_nodes: IndexSet<NodeId>,
    failed_nodes: IndexSet<NodeId>,
    data_registry: IndexMap<NodeId, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
}

impl WorkflowState {
    /// Initial state of every run.
    pub fn new() -> Self {
        Self {
            phase: WorkflowPhase::Initializing,
            active_nodes: IndexSet::new(),
            completed_nodes: IndexSet::new(),
            failed_nodes: IndexSet::new(),
            data_registry: IndexMap::new(),
            failure: None,
        }
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    /// Nodes dispatched for execution and not yet completed.
    pub fn active_nodes(&self) -> &IndexSet<NodeId> {
        &self.active_nodes
    }

    pub fn completed_nodes(&self) -> &IndexSet<NodeId> {
        &self.completed_nodes
    }

    /// Nodes that were active when the workflow failed.
    pub fn failed_nodes(&self) -> &IndexSet<NodeId> {
        &self.failed_nodes
    }

    /// Outputs of completed nodes.
    pub fn data_registry(&self) -> &IndexMap<NodeId, Value> {
        &self.data_registry
    }

    /// Output recorded for a node, if it completed.
    pub fn output(&self, id: &NodeId) -> Option<&Value> {
        self.data_registry.get(id)
    }

    /// Reason recorded by the failure transition.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}

/// Input to the state machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StateEvent {
    /// A batch was handed to the executor.
    NodesReady { node_ids: Vec<NodeId> },
    /// A node finished with the given output.
    NodeCompleted { node_id: NodeId, output: Value },
    /// Every node has completed.
    AllNodesCompleted,
    /// The run failed; active nodes are marked failed.
    WorkflowFailed { reason: String },
}

impl StateEvent {
    pub fn nodes_ready(node_ids: impl IntoIterator<Item = NodeId>) -> Self {
        StateEvent::NodesReady {
            node_ids: node_ids.into_iter().collect(),
        }
    }

    pub fn node_completed(node_id: NodeId, output: Value) -> Self {
        StateEvent::NodeCompleted { node_id, output }
    }

    pub fn workflow_failed(reason: impl Into<String>) -> Self {
        StateEvent::WorkflowFailed {
            reason: reason.into(),
        }
    }

    /// Event name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            StateEvent::NodesReady { .. } => "NODES_READY",
            StateEvent::NodeCompleted { .. } => "NODE_COMPLETED",
            StateEvent::AllNodesCompleted => "ALL_NODES_COMPLETED",
            StateEvent::WorkflowFailed { .. } => "WORKFLOW_FAILED",
        }
    }
}

/// Rejected state transition.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot apply {event} in terminal phase {phase}")]
    Terminal {
        phase: WorkflowPhase,
        event: &'static str,
    },

    #[error("node {0} completed but was not active")]
    NodeNotActive(NodeId),

    #[error("cannot complete workflow while nodes are still active: {}", join_ids(.0))]
    NodesStillActive(Vec<NodeId>),
}

/// Pure transition function of the workflow state machine.
#[derive(Clone, Copy, Debug, Default)]
pub struct StateTransition;

impl StateTransition {
    /// Applies an event and returns the resulting state.
    ///
    /// The input state is never modified.
    ///
    /// # Errors
    ///
    /// - [`TransitionError::Terminal`] for any event in Completed or Failed
    /// - [`TransitionError::NodeNotActive`] when completing a node that was
    ///   not dispatched
    /// - [`TransitionError::NodesStillActive`] when finishing the workflow
    ///   with nodes still running
    pub fn apply(state: &WorkflowState, event: StateEvent) -> Result<WorkflowState, TransitionError> {
        if state.phase.is_terminal() {
            return Err(TransitionError::Terminal {
                phase: state.phase,
                event: event.name(),
            });
        }

        let mut next = state.clone();

        match event {
            StateEvent::NodesReady { node_ids } => {
                next.active_nodes.extend(node_ids);
                next.phase = WorkflowPhase::ExecutingNodes;
            }
            StateEvent::NodeCompleted { node_id, output } => {
                if !next.active_nodes.shift_remove(&node_id) {
                    return Err(TransitionError::NodeNotActive(node_id));
                }
                next.completed_nodes.insert(node_id);
                next.data_registry.insert(node_id, output);
            }
            StateEvent::AllNodesCompleted => {
                if !next.active_nodes.is_empty() {
                    return Err(TransitionError::NodesStillActive(
                        next.active_nodes.iter().copied().collect(),
                    ));
                }
                next.phase = WorkflowPhase::Completed;
            }
            StateEvent::WorkflowFailed { reason } => {
                let active = std::mem::take(&mut next.active_nodes);
                next.failed_nodes.extend(active);
                next.failure = Some(reason);
                next.phase = WorkflowPhase::Failed;
            }
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn executing(ids: &[NodeId]) -> WorkflowState {
        StateTransition::apply(&WorkflowState::new(), StateEvent::nodes_ready(ids.to_vec())).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let state = WorkflowState::new();
        assert_eq!(state.phase(), WorkflowPhase::Initializing);
        assert!(state.active_nodes().is_empty());
        assert!(state.data_registry().is_empty());
        assert!(state.failure().is_none());
    }

    #[test]
    fn test_nodes_ready_enters_executing() {
        let a = NodeId::new();
        let initial = WorkflowState::new();
        let state = StateTransition::apply(&initial, StateEvent::nodes_ready([a])).unwrap();

        assert_eq!(state.phase(), WorkflowPhase::ExecutingNodes);
        assert!(state.active_nodes().contains(&a));
        // Input untouched.
        assert_eq!(initial, WorkflowState::new());
    }

    #[test]
    fn test_node_completed_moves_to_completed() {
        let a = NodeId::new();
        let state = StateTransition::apply(
            &executing(&[a]),
            StateEvent::node_completed(a, json!({ "rows": 3 })),
        )
        .unwrap();

        assert!(state.active_nodes().is_empty());
        assert!(state.completed_nodes().contains(&a));
        assert_eq!(state.output(&a), Some(&json!({ "rows": 3 })));
        assert_eq!(state.phase(), WorkflowPhase::ExecutingNodes);
    }

    #[test]
    fn test_node_completed_requires_active() {
        let a = NodeId::new();
        let ghost = NodeId::new();
        let err = StateTransition::apply(&executing(&[a]), StateEvent::node_completed(ghost, Value::Null))
            .unwrap_err();
        assert_eq!(err, TransitionError::NodeNotActive(ghost));
    }

    #[test]
    fn test_all_completed_rejected_while_active() {
        let a = NodeId::new();
        let err = StateTransition::apply(&executing(&[a]), StateEvent::AllNodesCompleted).unwrap_err();
        assert_eq!(err, TransitionError::NodesStillActive(vec![a]));
    }

    #[test]
    fn test_all_completed_from_initializing() {
        let state = StateTransition::apply(&WorkflowState::new(), StateEvent::AllNodesCompleted).unwrap();
        assert_eq!(state.phase(), WorkflowPhase::Completed);
    }

    #[test]
    fn test_failure_marks_active_nodes_failed() {
        let a = NodeId::new();
        let b = NodeId::new();
        let state = StateTransition::apply(&executing(&[a, b]), StateEvent::node_completed(a, json!(1))).unwrap();
        let failed = StateTransition::apply(&state, StateEvent::workflow_failed("boom")).unwrap();

        assert_eq!(failed.phase(), WorkflowPhase::Failed);
        assert!(failed.active_nodes().is_empty());
        assert_eq!(failed.failed_nodes().iter().copied().collect::<Vec<_>>(), vec![b]);
        assert!(failed.completed_nodes().contains(&a));
        assert_eq!(failed.failure(), Some("boom"));
    }

    #[test]
    fn test_terminal_phases_reject_events() {
        let completed = StateTransition::apply(&WorkflowState::new(), StateEvent::AllNodesCompleted).unwrap();
        let err = StateTransition::apply(&completed, StateEvent::nodes_ready([NodeId::new()])).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Terminal {
                phase: WorkflowPhase::Completed,
                event: "NODES_READY",
            }
        );

        let failed = StateTransition::apply(&WorkflowState::new(), StateEvent::workflow_failed("x")).unwrap();
        assert!(matches!(
            StateTransition::apply(&failed, StateEvent::workflow_failed("again")),
            Err(TransitionError::Terminal {
                phase: WorkflowPhase::Failed,
                ..
            })
        ));
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_eq!(executing(&[a, b]), executing(&[b, a]));
    }

    #[test]
    fn test_state_serializes_to_json() {
        let a = NodeId::new();
        let state = StateTransition::apply(&executing(&[a]), StateEvent::node_completed(a, json!("ok"))).unwrap();

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["phase"], "EXECUTING_NODES");
        assert_eq!(value["data_registry"][a.to_string()], "ok");
        assert!(value.get("failure").is_none());

        let back: WorkflowState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }
}
