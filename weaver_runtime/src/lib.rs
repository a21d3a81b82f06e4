//! Weaver runtime - async node execution for the workflow coordinator.
//!
//! `weaver-core` stays synchronous and deterministic; this crate provides the
//! execution substrate on the other side of its executor boundary:
//!
//! - [`AsyncNodeExecutor`] and [`execute_workflow_async`]: the async
//!   counterpart of `NodeExecutor`, driving the same run stepper
//! - [`NodeHandler`] and [`HandlerRegistry`]: per-kind node logic
//! - [`ConcurrentExecutor`]: one tokio task per node, with an optional batch
//!   timeout, concurrency cap and cancellation token
//!
//! # Example
//!
//! ```rust,no_run
//! use weaver_core::{ExecutionCoordinator, WorkflowDefinition};
//! use weaver_runtime::{execute_workflow_async, ConcurrentExecutor, ExecutorConfig, HandlerRegistry};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let definition = WorkflowDefinition::from_file("order-sync.yaml").await?;
//! let graph = definition.to_graph()?;
//!
//! let mut executor = ConcurrentExecutor::new(HandlerRegistry::echo())
//!     .with_config(ExecutorConfig::from(&definition.settings));
//! let mut coordinator = ExecutionCoordinator::new();
//! let state = execute_workflow_async(&mut coordinator, graph.nodes(), graph.edges(), &mut executor).await?;
//! println!("{}", state.phase());
//! # Ok(())
//! # }
//! ```

pub mod concurrent;
pub mod executor;
pub mod handler;

pub use concurrent::{ConcurrentExecutor, ExecutionError, ExecutorConfig};
pub use executor::{execute_workflow_async, AsyncNodeExecutor};
pub use handler::{EchoHandler, FnHandler, HandlerRegistry, NodeContext, NodeHandler};
