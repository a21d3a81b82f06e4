//! Weaver - deterministic workflow DAG execution core.
//!
//! This crate takes a directed acyclic graph of workflow nodes and drives it
//! to completion with maximum safe parallelism:
//!
//! - **Graph types**: [`Node`], [`Edge`] and the [`NodeKind`] tagged union
//! - **Topological sorter**: Kahn's algorithm with cycle diagnostics
//! - **Graph validator**: edge integrity, acyclicity, connectivity and
//!   conditional branch checks, reporting every violation at once
//! - **Active node queue**: live execution frontier handing out ready batches
//! - **Execution coordinator**: validate, schedule, execute batches through a
//!   caller-supplied [`NodeExecutor`], advance the [`WorkflowState`] machine
//!
//! The coordinator never runs node business logic itself and never spawns
//! threads. All parallelism lives behind the [`NodeExecutor`] boundary, which
//! keeps orchestration deterministic and replayable.
//!
//! # Quick Start
//!
//! ```rust
//! use weaver_core::{BoxError, Edge, ExecutionCoordinator, Node, NodeKind, NodeOutput, WorkflowPhase};
//! use weaver_core::workflow::graph::TriggerConfig;
//!
//! let a = Node::new(NodeKind::Trigger(TriggerConfig::default()));
//! let b = Node::new(NodeKind::Trigger(TriggerConfig::default()));
//! let edges = vec![Edge::new(a.id, b.id)];
//! let nodes = vec![a, b];
//!
//! let mut echo = |batch: &[Node]| -> Result<Vec<NodeOutput>, BoxError> {
//!     Ok(batch
//!         .iter()
//!         .map(|node| NodeOutput::new(node.id, node.id.to_string()))
//!         .collect())
//! };
//!
//! let mut coordinator = ExecutionCoordinator::new();
//! let state = coordinator.execute_workflow(&nodes, &edges, &mut echo).unwrap();
//! assert_eq!(state.phase(), WorkflowPhase::Completed);
//! ```
//!
//! # Modules
//!
//! - [`workflow`]: graph types, sorter, validator, scheduler, state machine, coordinator
//! - [`audit`]: per-run event log with JSON persistence
//! - [`definition`]: YAML workflow definitions
//! - [`error`]: coordinator error type

pub mod audit;
pub mod definition;
pub mod error;
pub mod workflow;

pub use audit::{AuditError, RunEvent, RunLog};
pub use definition::{DefinitionError, WorkflowDefinition, WorkflowSettings};
pub use error::{BoxError, WorkflowError};
pub use workflow::coordinator::{ExecutionCoordinator, NodeExecutor, NodeOutput, WorkflowRun};
pub use workflow::graph::{Edge, EdgeId, Node, NodeId, NodeKind, NodeKindTag, WorkflowGraph};
pub use workflow::scheduler::{ActiveNodeQueue, SchedulerError};
pub use workflow::sort::{SortError, TopologicalSorter};
pub use workflow::state::{StateEvent, StateTransition, TransitionError, WorkflowPhase, WorkflowState};
pub use workflow::validate::{GraphValidator, ValidationIssue, ValidationReport};
