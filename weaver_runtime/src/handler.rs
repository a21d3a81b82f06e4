//! Per-kind node handlers.
//!
//! A [`NodeHandler`] performs the actual work of one node. Handlers are
//! registered per [`NodeKindTag`] in a [`HandlerRegistry`], which is how the
//! runtime selects execution by node kind without the coordinator ever
//! looking at node configuration.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use weaver_core::{BoxError, Node, NodeId, NodeKindTag};

/// Everything a handler gets to see about the node it runs.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// Node being executed
    pub node: Node,
    /// Outputs of every node completed in earlier batches
    pub outputs: Arc<IndexMap<NodeId, Value>>,
    /// Cancelled when the batch times out, fails or the run is cancelled
    pub cancel: CancellationToken,
}

impl NodeContext {
    /// Output of an earlier node, if it has completed.
    pub fn upstream(&self, id: &NodeId) -> Option<&Value> {
        self.outputs.get(id)
    }
}

/// Executes nodes of one kind.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(&self, context: NodeContext) -> Result<Value, BoxError>;
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, BoxError>> + Send>>;

/// Handler backed by an async closure.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use weaver_core::BoxError;
/// use weaver_runtime::FnHandler;
///
/// let handler = FnHandler::new(|ctx| async move {
///     Ok::<_, BoxError>(json!({ "node": ctx.node.label() }))
/// });
/// ```
pub struct FnHandler {
    f: Box<dyn Fn(NodeContext) -> HandlerFuture + Send + Sync>,
}

impl FnHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        Self {
            f: Box::new(move |ctx| Box::pin(f(ctx)) as HandlerFuture),
        }
    }
}

impl fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl NodeHandler for FnHandler {
    async fn execute(&self, context: NodeContext) -> Result<Value, BoxError> {
        (self.f)(context).await
    }
}

/// Returns the node's own configuration as its output.
///
/// Used for dry runs where no side effect should happen.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl NodeHandler for EchoHandler {
    async fn execute(&self, context: NodeContext) -> Result<Value, BoxError> {
        Ok(context.node.kind.config_value()?)
    }
}

/// Maps node kinds to handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeKindTag, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with an [`EchoHandler`] for every node kind.
    pub fn echo() -> Self {
        NodeKindTag::ALL
            .into_iter()
            .fold(Self::new(), |registry, tag| registry.with_handler(tag, EchoHandler))
    }

    /// Registers a handler, replacing any previous one for the kind.
    pub fn register(&mut self, tag: NodeKindTag, handler: impl NodeHandler + 'static) {
        self.register_arc(tag, Arc::new(handler));
    }

    /// Registers a shared handler.
    pub fn register_arc(&mut self, tag: NodeKindTag, handler: Arc<dyn NodeHandler>) {
        if self.handlers.insert(tag, handler).is_some() {
            tracing::debug!(kind = %tag, "replaced node handler");
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_handler(mut self, tag: NodeKindTag, handler: impl NodeHandler + 'static) -> Self {
        self.register(tag, handler);
        self
    }

    pub fn get(&self, tag: NodeKindTag) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&tag).cloned()
    }

    pub fn contains(&self, tag: NodeKindTag) -> bool {
        self.handlers.contains_key(&tag)
    }

    /// Registered kinds, in declaration order.
    pub fn kinds(&self) -> Vec<NodeKindTag> {
        NodeKindTag::ALL
            .into_iter()
            .filter(|tag| self.handlers.contains_key(tag))
            .collect()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
