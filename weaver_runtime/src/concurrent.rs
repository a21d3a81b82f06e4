//! Concurrent batch execution on tokio.
//!
//! [`ConcurrentExecutor`] runs every node of a batch as its own task in a
//! [`JoinSet`], dispatching by node kind through a [`HandlerRegistry`]. The
//! batch as a whole can be bounded by a timeout, limited to a number of
//! simultaneously running nodes, and cancelled through a
//! [`CancellationToken`]. Every one of those surfaces as an executor error,
//! which the coordinator turns into a failed workflow.

use crate::executor::AsyncNodeExecutor;
use crate::handler::{HandlerRegistry, NodeContext};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use weaver_core::{BoxError, Node, NodeId, NodeKindTag, NodeOutput, WorkflowSettings};

/// Errors raised while executing a batch.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("no handler registered for node {node} of kind {kind}")]
    NoHandler { node: NodeId, kind: NodeKindTag },

    #[error("node {node} failed: {source}")]
    NodeFailed { node: NodeId, source: BoxError },

    #[error("batch timed out after {after:?}")]
    BatchTimeout { after: Duration },

    #[error("batch cancelled")]
    Cancelled,

    #[error("node task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Batch execution limits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Upper bound for a whole batch
    pub batch_timeout: Option<Duration>,
    /// Maximum number of nodes running at once
    pub max_concurrency: Option<usize>,
}

impl ExecutorConfig {
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }
}

impl From<&WorkflowSettings> for ExecutorConfig {
    fn from(settings: &WorkflowSettings) -> Self {
        Self {
            batch_timeout: settings.timeout_ms.map(Duration::from_millis),
            max_concurrency: settings.max_concurrency,
        }
    }
}

type NodeResult = (NodeId, Result<Value, BoxError>);

/// Runs batches concurrently with per-kind handlers.
///
/// Outputs of completed nodes accumulate across the batches of one run and
/// are handed to later handlers through [`NodeContext::outputs`].
#[derive(Debug)]
pub struct ConcurrentExecutor {
    registry: HandlerRegistry,
    config: ExecutorConfig,
    cancel: CancellationToken,
    outputs: IndexMap<NodeId, Value>,
}

impl ConcurrentExecutor {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            config: ExecutorConfig::default(),
            cancel: CancellationToken::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels the current and every later batch.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Outputs collected during the current run, in completion order of
    /// their batches.
    pub fn outputs(&self) -> &IndexMap<NodeId, Value> {
        &self.outputs
    }

    /// Forgets the outputs of the previous run.
    ///
    /// [`execute_workflow_async`](crate::execute_workflow_async) calls this
    /// at the start of every run; callers driving [`run_batch`](Self::run_batch)
    /// themselves must do so between runs.
    pub fn reset(&mut self) {
        if !self.outputs.is_empty() {
            tracing::debug!(discarded = self.outputs.len(), "clearing outputs of previous run");
        }
        self.outputs.clear();
    }

    /// Executes one batch and returns its outputs in batch order.
    ///
    /// Handlers are resolved for every node before anything is spawned, so
    /// a missing handler fails the batch without running any node. On the
    /// first failure, timeout or cancellation the remaining tasks are
    /// aborted and the batch token is cancelled.
    pub async fn run_batch(&mut self, batch: Vec<Node>) -> Result<Vec<NodeOutput>, ExecutionError> {
        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        let mut jobs = Vec::with_capacity(batch.len());
        for node in batch {
            let kind = node.tag();
            let handler = self.registry.get(kind).ok_or(ExecutionError::NoHandler {
                node: node.id,
                kind,
            })?;
            jobs.push((node, handler));
        }

        let order: Vec<NodeId> = jobs.iter().map(|(node, _)| node.id).collect();
        let snapshot = Arc::new(self.outputs.clone());
        let limiter = self
            .config
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        let batch_cancel = self.cancel.child_token();

        tracing::debug!(
            size = order.len(),
            timeout = ?self.config.batch_timeout,
            max_concurrency = ?self.config.max_concurrency,
            "spawning batch"
        );

        let mut tasks: JoinSet<NodeResult> = JoinSet::new();
        for (node, handler) in jobs {
            let context = NodeContext {
                node,
                outputs: Arc::clone(&snapshot),
                cancel: batch_cancel.clone(),
            };
            let limiter = limiter.clone();

            tasks.spawn(async move {
                let id = context.node.id;
                let _permit = match limiter {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(err) => return (id, Err(err.into())),
                    },
                    None => None,
                };
                (id, handler.execute(context).await)
            });
        }

        let timeout = self.config.batch_timeout;
        let bounded = async {
            match timeout {
                Some(after) => tokio::time::timeout(after, collect(&mut tasks))
                    .await
                    .unwrap_or_else(|_elapsed| Err(ExecutionError::BatchTimeout { after })),
                None => collect(&mut tasks).await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExecutionError::Cancelled),
            result = bounded => result,
        };

        let mut results = match outcome {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(error = %err, "batch aborted");
                batch_cancel.cancel();
                tasks.abort_all();
                return Err(err);
            }
        };

        let outputs: Vec<NodeOutput> = order
            .into_iter()
            .filter_map(|id| results.remove(&id).map(|output| NodeOutput::new(id, output)))
            .collect();

        for output in &outputs {
            self.outputs.insert(output.node_id, output.output.clone());
        }

        Ok(outputs)
    }
}

/// Waits for every task, failing fast on the first node error.
async fn collect(tasks: &mut JoinSet<NodeResult>) -> Result<HashMap<NodeId, Value>, ExecutionError> {
    let mut results = HashMap::with_capacity(tasks.len());

    while let Some(joined) = tasks.join_next().await {
        let (node, result) = joined?;
        match result {
            Ok(value) => {
                results.insert(node, value);
            }
            Err(source) => {
                tracing::warn!(node_id = %node, error = %source, "node handler failed");
                return Err(ExecutionError::NodeFailed { node, source });
            }
        }
    }

    Ok(results)
}

#[async_trait]
impl AsyncNodeExecutor for ConcurrentExecutor {
    async fn execute_batch(&mut self, batch: Vec<Node>) -> Result<Vec<NodeOutput>, BoxError> {
        Ok(self.run_batch(batch).await?)
    }

    fn begin_run(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EchoHandler, FnHandler};
    use serde_json::json;
    use weaver_core::workflow::graph::{TransformConfig, TriggerConfig};
    use weaver_core::NodeKind;

    fn trigger() -> Node {
        Node::new(NodeKind::Trigger(TriggerConfig {
            payload: json!({ "order": 7 }),
        }))
    }

    #[test]
    fn test_config_from_settings() {
        let settings = WorkflowSettings {
            timeout_ms: Some(1500),
            max_concurrency: Some(3),
        };
        let config = ExecutorConfig::from(&settings);
        assert_eq!(config.batch_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.max_concurrency, Some(3));

        assert_eq!(ExecutorConfig::from(&WorkflowSettings::default()), ExecutorConfig::default());
    }

    #[tokio::test]
    async fn test_outputs_in_batch_order() {
        let nodes = vec![trigger(), trigger(), trigger()];
        let mut executor = ConcurrentExecutor::new(HandlerRegistry::echo());

        let outputs = executor.run_batch(nodes.clone()).await.unwrap();
        let ids: Vec<NodeId> = outputs.iter().map(|output| output.node_id).collect();
        assert_eq!(ids, nodes.iter().map(|node| node.id).collect::<Vec<_>>());
        assert_eq!(outputs[0].output["payload"]["order"], 7);
        assert_eq!(executor.outputs().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_handler_runs_nothing() {
        let registry = HandlerRegistry::new().with_handler(NodeKindTag::Trigger, EchoHandler);
        let transform = Node::new(NodeKind::Transform(TransformConfig {
            expression: "$.order".to_string(),
            input: None,
        }));
        let mut executor = ConcurrentExecutor::new(registry);

        let err = executor
            .run_batch(vec![trigger(), transform.clone()])
            .await
            .unwrap_err();
        match err {
            ExecutionError::NoHandler { node, kind } => {
                assert_eq!(node, transform.id);
                assert_eq!(kind, NodeKindTag::Transform);
            }
            other => panic!("expected missing handler, got {:?}", other),
        }
        assert!(executor.outputs().is_empty());
    }

    #[tokio::test]
    async fn test_node_failure_fails_batch() {
        let registry = HandlerRegistry::new().with_handler(
            NodeKindTag::Trigger,
            FnHandler::new(|_| async { Err::<Value, BoxError>("bad payload".into()) }),
        );
        let node = trigger();
        let mut executor = ConcurrentExecutor::new(registry);

        let err = executor.run_batch(vec![node.clone()]).await.unwrap_err();
        match err {
            ExecutionError::NodeFailed { node: failed, source } => {
                assert_eq!(failed, node.id);
                assert_eq!(source.to_string(), "bad payload");
            }
            other => panic!("expected node failure, got {:?}", other),
        }
        assert!(executor.outputs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_timeout() {
        let registry = HandlerRegistry::new().with_handler(
            NodeKindTag::Trigger,
            FnHandler::new(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<Value, BoxError>(Value::Null)
            }),
        );
        let mut executor = ConcurrentExecutor::new(registry)
            .with_config(ExecutorConfig::default().with_batch_timeout(Duration::from_millis(50)));

        let err = executor.run_batch(vec![trigger()]).await.unwrap_err();
        assert!(matches!(err, ExecutionError::BatchTimeout { after } if after == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_reset_clears_outputs() {
        let mut executor = ConcurrentExecutor::new(HandlerRegistry::echo());
        executor.run_batch(vec![trigger()]).await.unwrap();
        assert_eq!(executor.outputs().len(), 1);

        executor.begin_run();
        assert!(executor.outputs().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut executor = ConcurrentExecutor::new(HandlerRegistry::echo());
        executor.cancel_token().cancel();

        let err = executor.run_batch(vec![trigger()]).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled));
    }
}
