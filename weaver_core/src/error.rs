//! Coordinator error type.

use crate::workflow::graph::{join_ids, NodeId};
use crate::workflow::scheduler::SchedulerError;
use crate::workflow::state::{TransitionError, WorkflowState};

/// Boxed error crossing the node executor boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by [`ExecutionCoordinator`](crate::ExecutionCoordinator).
///
/// None of these is retried internally. Variants raised after execution
/// started carry the failed [`WorkflowState`] so callers can see which nodes
/// completed and which were in flight.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The graph failed structural validation. Nothing was executed.
    #[error("workflow validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// The node executor returned an error for a batch.
    #[error("node execution failed")]
    Execution {
        state: Box<WorkflowState>,
        source: BoxError,
    },

    /// The node executor returned outputs that do not match its batch.
    #[error("executor contract violated: {reason}")]
    ExecutorContract {
        reason: String,
        state: Box<WorkflowState>,
    },

    /// Work remains but no node is ready.
    #[error("deadlock: {} node(s) can never become ready: {}", remaining.len(), join_ids(remaining))]
    Deadlock {
        remaining: Vec<NodeId>,
        state: Box<WorkflowState>,
    },

    /// The run ended with fewer completed nodes than the graph has.
    #[error("completion mismatch: {completed} of {expected} node(s) completed")]
    CompletionMismatch {
        completed: usize,
        expected: usize,
        state: Box<WorkflowState>,
    },

    /// A [`WorkflowRun`](crate::WorkflowRun) was stepped out of order. The
    /// run itself is left as it was.
    #[error("workflow run stepped out of order: {reason}")]
    StepOutOfOrder { reason: String },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl WorkflowError {
    /// Returns the failed state for errors raised after execution started.
    pub fn state(&self) -> Option<&WorkflowState> {
        match self {
            WorkflowError::Execution { state, .. }
            | WorkflowError::ExecutorContract { state, .. }
            | WorkflowError::Deadlock { state, .. }
            | WorkflowError::CompletionMismatch { state, .. } => Some(&**state),
            WorkflowError::Validation { .. }
            | WorkflowError::StepOutOfOrder { .. }
            | WorkflowError::Scheduler(_)
            | WorkflowError::Transition(_) => None,
        }
    }

    /// True unless the run was rejected before any node was scheduled.
    pub fn execution_started(&self) -> bool {
        !matches!(self, WorkflowError::Validation { .. })
    }
}
