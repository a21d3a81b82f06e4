//! YAML workflow definitions.
//!
//! A definition names its nodes with short string keys and declares
//! dependencies either as an `edges` list or as per-node `depends_on`.
//! Loading turns it into the [`Node`]/[`Edge`] value types:
//!
//! ```yaml
//! name: order-sync
//! settings:
//!   timeout_ms: 30000
//!   max_concurrency: 4
//! nodes:
//!   - id: start
//!     type: trigger
//!   - id: fetch
//!     type: http
//!     config:
//!       url: https://shop.example.com/orders
//!     depends_on: [start]
//!   - id: store
//!     type: database
//!     config:
//!       query: INSERT INTO orders SELECT * FROM json_populate_recordset(NULL, $1)
//! edges:
//!   - from: fetch
//!     to: store
//! ```
//!
//! Keys that parse as UUIDs are used as node ids directly. Any other key is
//! mapped to a name-based (v5) UUID derived from the workflow name and the
//! key, so the same definition always yields the same ids. Loading performs
//! no structural checks; duplicate keys and unknown references are reported
//! by the graph validator like for any other graph.

use crate::workflow::graph::{Edge, EdgeId, Node, NodeId, NodeKind, NodeKindTag, WorkflowGraph};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while loading a workflow definition.
#[derive(Error, Debug)]
pub enum DefinitionError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Node configuration does not match its type
    #[error("invalid config for node '{node}': {source}")]
    InvalidConfig {
        node: String,
        source: serde_json::Error,
    },
}

/// Execution settings carried by a definition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Upper bound for a single batch, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Maximum number of nodes running at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

/// Workflow definition from YAML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name, also the namespace for derived node ids
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub settings: WorkflowSettings,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// Node entry of a definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Key referenced by edges and `depends_on`
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: NodeKindTag,
    /// Kind-specific configuration
    #[serde(default)]
    pub config: Value,
    /// Keys of nodes this node depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// Edge entry of a definition: `to` depends on `from`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
}

impl WorkflowDefinition {
    /// Parses a definition from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DefinitionError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a definition file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path).await?;
        let definition = Self::from_yaml_str(&yaml)?;

        tracing::debug!(
            path = %path.display(),
            workflow = %definition.name,
            nodes = definition.nodes.len(),
            "workflow definition loaded"
        );

        Ok(definition)
    }

    /// Serializes the definition back to YAML.
    pub fn to_yaml_string(&self) -> Result<String, DefinitionError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Node id a key maps to in this workflow.
    pub fn node_id_for(&self, key: &str) -> NodeId {
        match Uuid::parse_str(key) {
            Ok(uuid) => NodeId::from_uuid(uuid),
            Err(_) => NodeId::from_uuid(self.derived_uuid(key)),
        }
    }

    /// Converts the definition into nodes and edges.
    ///
    /// Edges from the `edges` list come first, then `depends_on` edges in
    /// node order. Edge ids are derived like node ids.
    pub fn to_graph(&self) -> Result<WorkflowGraph, DefinitionError> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for definition in &self.nodes {
            let kind = NodeKind::from_parts(definition.kind, definition.config.clone()).map_err(|source| {
                DefinitionError::InvalidConfig {
                    node: definition.id.clone(),
                    source,
                }
            })?;

            let mut node = Node::with_id(self.node_id_for(&definition.id), kind);
            node.name = Some(definition.name.clone().unwrap_or_else(|| definition.id.clone()));
            nodes.push(node);
        }

        let declared = self
            .edges
            .iter()
            .map(|edge| (edge.from.as_str(), edge.to.as_str()));
        let implied = self.nodes.iter().flat_map(|node| {
            node.depends_on
                .iter()
                .map(move |dependency| (dependency.as_str(), node.id.as_str()))
        });

        let edges = declared
            .chain(implied)
            .enumerate()
            .map(|(position, (from, to))| {
                let id = self.derived_uuid(&format!("edge:{}:{}->{}", position, from, to));
                Edge::with_id(EdgeId::from_uuid(id), self.node_id_for(from), self.node_id_for(to))
            })
            .collect();

        Ok(WorkflowGraph::new(nodes, edges))
    }

    fn derived_uuid(&self, key: &str) -> Uuid {
        let name = format!("weaver:{}:{}", self.name, key);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::graph::EntityOperation;
    use crate::workflow::validate::GraphValidator;
    use tempfile::TempDir;

    const ORDER_SYNC: &str = r#"
name: order-sync
description: Pull new orders and store them
settings:
  timeout_ms: 5000
  max_concurrency: 2
nodes:
  - id: start
    type: trigger
  - id: fetch
    type: http
    config:
      method: POST
      url: https://shop.example.com/orders
      headers:
        accept: application/json
    depends_on: [start]
  - id: upsert
    name: Upsert customers
    type: entity
    config:
      entity: customer
      operation: update
edges:
  - from: fetch
    to: upsert
"#;

    #[test]
    fn test_parse_definition() {
        let definition = WorkflowDefinition::from_yaml_str(ORDER_SYNC).unwrap();
        assert_eq!(definition.name, "order-sync");
        assert_eq!(definition.settings.timeout_ms, Some(5000));
        assert_eq!(definition.settings.max_concurrency, Some(2));
        assert_eq!(definition.nodes.len(), 3);
        assert_eq!(definition.nodes[1].kind, NodeKindTag::Http);
        assert_eq!(definition.nodes[1].depends_on, vec!["start".to_string()]);
    }

    #[test]
    fn test_to_graph() {
        let definition = WorkflowDefinition::from_yaml_str(ORDER_SYNC).unwrap();
        let graph = definition.to_graph().unwrap();

        assert_eq!(graph.nodes().len(), 3);
        assert_eq!(graph.edges().len(), 2);

        let start = definition.node_id_for("start");
        let fetch = definition.node_id_for("fetch");
        let upsert = definition.node_id_for("upsert");

        // Declared edges first, then depends_on.
        assert_eq!((graph.edges()[0].source, graph.edges()[0].target), (fetch, upsert));
        assert_eq!((graph.edges()[1].source, graph.edges()[1].target), (start, fetch));

        let node = graph.node(&upsert).unwrap();
        assert_eq!(node.name.as_deref(), Some("Upsert customers"));
        match &node.kind {
            NodeKind::Entity(config) => assert_eq!(config.operation, EntityOperation::Update),
            other => panic!("expected entity node, got {:?}", other),
        }
        assert_eq!(graph.node(&start).unwrap().label(), "start");

        assert!(GraphValidator::new().validate(graph.nodes(), graph.edges()).is_valid());
    }

    #[test]
    fn test_ids_are_stable() {
        let definition = WorkflowDefinition::from_yaml_str(ORDER_SYNC).unwrap();
        let first = definition.to_graph().unwrap();
        let second = definition.to_graph().unwrap();
        assert_eq!(first, second);

        let mut renamed = definition.clone();
        renamed.name = "other".to_string();
        assert_ne!(renamed.node_id_for("start"), definition.node_id_for("start"));
    }

    #[test]
    fn test_uuid_keys_are_used_verbatim() {
        let definition = WorkflowDefinition::from_yaml_str(ORDER_SYNC).unwrap();
        let id = Uuid::new_v4();
        assert_eq!(definition.node_id_for(&id.to_string()), NodeId::from_uuid(id));
    }

    #[test]
    fn test_invalid_config() {
        let yaml = r#"
name: broken
nodes:
  - id: query
    type: database
    config:
      params: [1, 2]
"#;
        let definition = WorkflowDefinition::from_yaml_str(yaml).unwrap();
        let err = definition.to_graph().unwrap_err();
        match err {
            DefinitionError::InvalidConfig { node, .. } => assert_eq!(node, "query"),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_reference_is_left_to_validator() {
        let yaml = r#"
name: dangling
nodes:
  - id: a
    type: trigger
    depends_on: [ghost]
"#;
        let definition = WorkflowDefinition::from_yaml_str(yaml).unwrap();
        let graph = definition.to_graph().unwrap();
        let report = GraphValidator::new().validate(graph.nodes(), graph.edges());
        assert!(!report.is_valid());
        assert!(report.errors()[0].contains(&definition.node_id_for("ghost").to_string()));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let yaml = r#"
name: bad
nodes:
  - id: a
    type: smtp
"#;
        let result = WorkflowDefinition::from_yaml_str(yaml);
        assert!(matches!(result, Err(DefinitionError::Yaml(_))));
    }

    #[test]
    fn test_yaml_round_trip() {
        let definition = WorkflowDefinition::from_yaml_str(ORDER_SYNC).unwrap();
        let yaml = definition.to_yaml_string().unwrap();
        let back = WorkflowDefinition::from_yaml_str(&yaml).unwrap();
        assert_eq!(back, definition);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("order-sync.yaml");
        tokio::fs::write(&path, ORDER_SYNC).await.unwrap();

        let definition = WorkflowDefinition::from_file(&path).await.unwrap();
        assert_eq!(definition.nodes.len(), 3);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = WorkflowDefinition::from_file("/nonexistent/workflow.yaml").await;
        assert!(matches!(result, Err(DefinitionError::Io(_))));
    }
}
