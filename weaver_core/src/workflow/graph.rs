//! Node and edge value types for workflow graphs.
//!
//! Nodes carry a stable [`NodeId`] and a [`NodeKind`]; edges are directional
//! dependency declarations (`target` depends on `source`). Neither type has
//! behavior beyond identity, so every graph operation in this crate is a
//! pure function over slices of them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a fresh random (v4) identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// Stable identity of a workflow node.
    NodeId
);

uuid_identifier!(
    /// Stable identity of a dependency edge.
    EdgeId
);

/// Discriminant of a [`NodeKind`], used for dispatch tables and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKindTag {
    Trigger,
    Http,
    Database,
    Entity,
    Transform,
    Conditional,
}

impl NodeKindTag {
    /// All node kinds, in declaration order.
    pub const ALL: [NodeKindTag; 6] = [
        NodeKindTag::Trigger,
        NodeKindTag::Http,
        NodeKindTag::Database,
        NodeKindTag::Entity,
        NodeKindTag::Transform,
        NodeKindTag::Conditional,
    ];

    /// Returns the wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKindTag::Trigger => "trigger",
            NodeKindTag::Http => "http",
            NodeKindTag::Database => "database",
            NodeKindTag::Entity => "entity",
            NodeKindTag::Transform => "transform",
            NodeKindTag::Conditional => "conditional",
        }
    }
}

impl fmt::Display for NodeKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Starts a workflow run; its payload is handed to downstream nodes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub payload: Value,
}

/// Outbound HTTP request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

fn default_http_method() -> String {
    "GET".to_string()
}

/// Parameterized database query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub query: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Operation performed by an entity node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityOperation {
    Create,
    Read,
    Update,
    Delete,
}

/// Create/read/update/delete against a named entity collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub entity: String,
    pub operation: EntityOperation,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Data reshaping step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    pub expression: String,
    #[serde(default)]
    pub input: Option<Value>,
}

/// Conditional control node.
///
/// Only the edge count is validated (at least a true and a false branch);
/// branch selection is not evaluated by the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalConfig {
    pub condition: String,
}

/// Kind of a workflow node together with its kind-specific configuration.
///
/// The configuration is opaque to the scheduler and coordinator; only the
/// runtime's handler registry looks inside it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum NodeKind {
    Trigger(TriggerConfig),
    Http(HttpConfig),
    Database(DatabaseConfig),
    Entity(EntityConfig),
    Transform(TransformConfig),
    Conditional(ConditionalConfig),
}

impl NodeKind {
    /// Builds a kind from its tag and a JSON configuration payload.
    ///
    /// A `null` configuration is treated as an empty object so kinds whose
    /// fields all have defaults can be declared without a config block.
    pub fn from_parts(tag: NodeKindTag, config: Value) -> Result<Self, serde_json::Error> {
        let config = if config.is_null() { json!({}) } else { config };
        serde_json::from_value(json!({ "type": tag.as_str(), "config": config }))
    }

    /// Returns the kind discriminant.
    pub fn tag(&self) -> NodeKindTag {
        match self {
            NodeKind::Trigger(_) => NodeKindTag::Trigger,
            NodeKind::Http(_) => NodeKindTag::Http,
            NodeKind::Database(_) => NodeKindTag::Database,
            NodeKind::Entity(_) => NodeKindTag::Entity,
            NodeKind::Transform(_) => NodeKindTag::Transform,
            NodeKind::Conditional(_) => NodeKindTag::Conditional,
        }
    }

    /// Returns true for conditional control nodes.
    pub fn is_conditional(&self) -> bool {
        matches!(self, NodeKind::Conditional(_))
    }

    /// Returns the configuration payload as JSON.
    pub fn config_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            NodeKind::Trigger(config) => serde_json::to_value(config),
            NodeKind::Http(config) => serde_json::to_value(config),
            NodeKind::Database(config) => serde_json::to_value(config),
            NodeKind::Entity(config) => serde_json::to_value(config),
            NodeKind::Transform(config) => serde_json::to_value(config),
            NodeKind::Conditional(config) => serde_json::to_value(config),
        }
    }
}

/// A workflow node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: NodeKind,
}

impl Node {
    /// Creates a node with a fresh identifier.
    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), kind)
    }

    /// Creates a node with the given identifier.
    pub fn with_id(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            name: None,
            kind,
        }
    }

    /// Sets a human-readable name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the name if set, otherwise the identifier.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// Returns the kind discriminant.
    pub fn tag(&self) -> NodeKindTag {
        self.kind.tag()
    }
}

/// Directional dependency: `target` depends on `source`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    /// Creates an edge with a fresh identifier.
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self::with_id(EdgeId::new(), source, target)
    }

    /// Creates an edge with the given identifier.
    pub fn with_id(id: EdgeId, source: NodeId, target: NodeId) -> Self {
        Self { id, source, target }
    }
}

/// Owned node and edge sets, as loaded from a workflow definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Looks up a node by identifier.
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Renders identifiers as a comma-separated list for error messages.
pub(crate) fn join_ids<T: fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_round_trips_through_string() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_node_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_kind_tag_matches_variant() {
        let node = Node::new(NodeKind::Conditional(ConditionalConfig {
            condition: "x > 1".to_string(),
        }));
        assert_eq!(node.tag(), NodeKindTag::Conditional);
        assert!(node.kind.is_conditional());

        let trigger = Node::new(NodeKind::Trigger(TriggerConfig::default()));
        assert!(!trigger.kind.is_conditional());
    }

    #[test]
    fn test_kind_from_parts() {
        let kind = NodeKind::from_parts(
            NodeKindTag::Http,
            json!({ "url": "https://example.com/orders" }),
        )
        .unwrap();

        match kind {
            NodeKind::Http(config) => {
                assert_eq!(config.method, "GET");
                assert_eq!(config.url, "https://example.com/orders");
                assert!(config.headers.is_empty());
            }
            other => panic!("expected http kind, got {:?}", other),
        }
    }

    #[test]
    fn test_kind_from_parts_null_config_uses_defaults() {
        let kind = NodeKind::from_parts(NodeKindTag::Trigger, Value::Null).unwrap();
        assert_eq!(kind, NodeKind::Trigger(TriggerConfig::default()));
    }

    #[test]
    fn test_kind_from_parts_missing_required_field() {
        let result = NodeKind::from_parts(NodeKindTag::Database, json!({}));
        assert!(result.is_err());
    }

    #[test]
    fn test_kind_serializes_adjacently_tagged() {
        let kind = NodeKind::Entity(EntityConfig {
            entity: "customer".to_string(),
            operation: EntityOperation::Update,
            data: None,
        });

        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "entity");
        assert_eq!(value["config"]["operation"], "update");
        assert_eq!(kind.config_value().unwrap()["entity"], "customer");
    }

    #[test]
    fn test_label_falls_back_to_id() {
        let node = Node::new(NodeKind::Trigger(TriggerConfig::default()));
        assert_eq!(node.label(), node.id.to_string());
        assert_eq!(node.clone().named("start").label(), "start");
    }

    #[test]
    fn test_graph_lookup() {
        let a = Node::new(NodeKind::Trigger(TriggerConfig::default()));
        let b = Node::new(NodeKind::Trigger(TriggerConfig::default()));
        let graph = WorkflowGraph::new(vec![a.clone(), b.clone()], vec![Edge::new(a.id, b.id)]);

        assert_eq!(graph.node(&b.id), Some(&b));
        assert_eq!(graph.edges().len(), 1);
        assert!(!graph.is_empty());
    }
}
