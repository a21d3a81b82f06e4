//! Workflow DAG execution.
//!
//! The workflow module drives a graph of nodes to completion:
//! - Validates the graph for broken edges, cycles, disconnected nodes and
//!   under-branched conditionals before anything runs
//! - Hands out batches of ready nodes as their dependencies complete
//! - Tracks progress through an explicit, immutable state machine
//!
//! # Architecture
//!
//! Components are composed bottom-up:
//! - [`graph`]: node and edge value types
//! - [`sort`]: Kahn's topological sort with cycle diagnostics
//! - [`validate`]: structural checks collected into a [`ValidationReport`]
//! - [`scheduler`]: the [`ActiveNodeQueue`] execution frontier
//! - [`state`]: [`WorkflowState`] and its pure transitions
//! - [`coordinator`]: the [`ExecutionCoordinator`] loop
//!
//! # Execution Model
//!
//! 1. Validate the graph (all findings, not just the first)
//! 2. Re-check the topological order
//! 3. Initialize the scheduler
//! 4. Pull a ready batch, hand it to the node executor, record outputs and
//!    release dependents, until no work remains

pub mod coordinator;
pub mod graph;
pub mod scheduler;
pub mod sort;
pub mod state;
pub mod validate;

pub use coordinator::{ExecutionCoordinator, NodeExecutor, NodeOutput, WorkflowRun};
pub use graph::{Edge, EdgeId, Node, NodeId, NodeKind, NodeKindTag, WorkflowGraph};
pub use scheduler::{ActiveNodeQueue, SchedulerError};
pub use sort::{SortError, TopologicalSorter};
pub use state::{StateEvent, StateTransition, TransitionError, WorkflowPhase, WorkflowState};
pub use validate::{GraphValidator, ValidationIssue, ValidationReport};
