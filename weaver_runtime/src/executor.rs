//! Async node executor boundary and coordinator driver.

use async_trait::async_trait;
use weaver_core::{BoxError, Edge, ExecutionCoordinator, Node, NodeOutput, WorkflowError, WorkflowState};

/// Async counterpart of [`weaver_core::NodeExecutor`].
///
/// Same contract: one output per node of the batch, in any order, returned
/// once the whole batch is done.
#[async_trait]
pub trait AsyncNodeExecutor: Send {
    async fn execute_batch(&mut self, batch: Vec<Node>) -> Result<Vec<NodeOutput>, BoxError>;

    /// Called once per run, after validation and before the first batch.
    ///
    /// Executors that keep per-run data drop it here.
    fn begin_run(&mut self) {}
}

/// Runs a workflow with an async executor.
///
/// Drives the same [`WorkflowRun`](weaver_core::WorkflowRun) stepper as
/// [`ExecutionCoordinator::execute_workflow`], so validation, state
/// transitions, contract checks and the run log behave identically. Only
/// the executor call is awaited.
pub async fn execute_workflow_async<E>(
    coordinator: &mut ExecutionCoordinator,
    nodes: &[Node],
    edges: &[Edge],
    executor: &mut E,
) -> Result<WorkflowState, WorkflowError>
where
    E: AsyncNodeExecutor + ?Sized,
{
    let mut run = coordinator.start_run(nodes, edges)?;
    executor.begin_run();

    while let Some(batch) = run.next_batch()? {
        let outcome = executor.execute_batch(batch).await;
        run.complete_batch(outcome)?;
    }

    run.conclude()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weaver_core::workflow::graph::TriggerConfig;
    use weaver_core::{NodeKind, WorkflowPhase};

    struct Labeller {
        calls: usize,
        runs: usize,
    }

    #[async_trait]
    impl AsyncNodeExecutor for Labeller {
        async fn execute_batch(&mut self, batch: Vec<Node>) -> Result<Vec<NodeOutput>, BoxError> {
            self.calls += 1;
            tokio::task::yield_now().await;
            Ok(batch
                .into_iter()
                .map(|node| NodeOutput::new(node.id, json!(node.label())))
                .collect())
        }

        fn begin_run(&mut self) {
            self.runs += 1;
        }
    }

    struct Broken;

    #[async_trait]
    impl AsyncNodeExecutor for Broken {
        async fn execute_batch(&mut self, _batch: Vec<Node>) -> Result<Vec<NodeOutput>, BoxError> {
            Err("upstream unavailable".into())
        }
    }

    fn trigger(name: &str) -> Node {
        Node::new(NodeKind::Trigger(TriggerConfig::default())).named(name)
    }

    #[tokio::test]
    async fn test_async_run_completes() {
        let a = trigger("a");
        let b = trigger("b");
        let edges = vec![Edge::new(a.id, b.id)];
        let nodes = vec![a.clone(), b.clone()];

        let mut executor = Labeller { calls: 0, runs: 0 };
        let mut coordinator = ExecutionCoordinator::new();
        let state = execute_workflow_async(&mut coordinator, &nodes, &edges, &mut executor)
            .await
            .unwrap();

        assert_eq!(state.phase(), WorkflowPhase::Completed);
        assert_eq!(state.output(&b.id), Some(&json!("b")));
        assert_eq!(executor.calls, 2);
        assert_eq!(executor.runs, 1);
        assert!(coordinator.last_run_log().is_some());
    }

    #[tokio::test]
    async fn test_async_empty_workflow_skips_executor() {
        let mut executor = Labeller { calls: 0, runs: 0 };
        let state = execute_workflow_async(&mut ExecutionCoordinator::new(), &[], &[], &mut executor)
            .await
            .unwrap();

        assert_eq!(state.phase(), WorkflowPhase::Completed);
        assert_eq!(executor.calls, 0);
        assert_eq!(executor.runs, 1);
    }

    #[tokio::test]
    async fn test_rejected_run_does_not_begin() {
        let a = trigger("a");
        let edges = vec![Edge::new(a.id, a.id)];

        let mut executor = Labeller { calls: 0, runs: 0 };
        let err = execute_workflow_async(&mut ExecutionCoordinator::new(), &[a], &edges, &mut executor)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Validation { .. }));
        assert_eq!(executor.runs, 0);
    }

    #[tokio::test]
    async fn test_async_failure_is_execution_error() {
        let nodes = vec![trigger("a")];
        let err = execute_workflow_async(&mut ExecutionCoordinator::new(), &nodes, &[], &mut Broken)
            .await
            .unwrap_err();

        match err {
            WorkflowError::Execution { state, source } => {
                assert_eq!(state.phase(), WorkflowPhase::Failed);
                assert_eq!(source.to_string(), "upstream unavailable");
            }
            other => panic!("expected execution error, got {:?}", other),
        }
    }
}
