use crate::{Config, NodeOutput};
use serde::{Deserialize, Serialize};

pub type NodeId = String;

/// Complete workflow document
///
/// Serializes as `{"metadata": {...}, "workflow": {"executionStrategy": ..., "nodes": [...]}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(rename = "workflow")]
    pub execution: ExecutionDetails,
}

impl Workflow {
    pub fn new(strategy: ExecutionStrategy) -> Self {
        Self {
            metadata: Metadata::default(),
            execution: ExecutionDetails {
                strategy,
                nodes: Vec::new(),
            },
        }
    }

    pub fn sequential() -> Self {
        Self::new(ExecutionStrategy::Sequential)
    }

    pub fn parallel() -> Self {
        Self::new(ExecutionStrategy::Parallel)
    }

    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.add_node(node);
        self
    }

    pub fn add_node(&mut self, node: NodeDefinition) -> NodeId {
        let id = node.id.clone();
        self.execution.nodes.push(node);
        id
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.execution.strategy
    }

    pub fn nodes(&self) -> &[NodeDefinition] {
        &self.execution.nodes
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeDefinition> {
        self.execution.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut NodeDefinition> {
        self.execution.nodes.iter_mut().find(|n| n.id == id)
    }
}

/// Free-form descriptive fields, never interpreted by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetails {
    #[serde(rename = "executionStrategy", default)]
    pub strategy: ExecutionStrategy,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStrategy {
    #[default]
    Sequential,
    Parallel,
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStrategy::Sequential => f.write_str("SEQUENTIAL"),
            ExecutionStrategy::Parallel => f.write_str("PARALLEL"),
        }
    }
}

/// One schedulable unit of work in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    #[serde(default)]
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub config: Config,
    /// Written by the engine only, once per run
    #[serde(default)]
    pub output: Option<NodeOutput>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: Config::new(),
            output: None,
        }
    }

    pub fn with_config(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeStatus;
    use serde_json::json;

    #[test]
    fn parses_the_document_shape() {
        let doc = json!({
            "metadata": { "version": "1.0", "author": "ops" },
            "workflow": {
                "executionStrategy": "PARALLEL",
                "nodes": [
                    { "id": "n1", "type": "Echo", "config": { "message": "hi" } },
                    { "id": "n2", "type": "time.delay" }
                ]
            }
        });

        let workflow: Workflow = serde_json::from_value(doc).unwrap();
        assert_eq!(workflow.strategy(), ExecutionStrategy::Parallel);
        assert_eq!(workflow.metadata.author.as_deref(), Some("ops"));
        assert_eq!(workflow.nodes().len(), 2);
        assert_eq!(workflow.nodes()[0].config["message"], json!("hi"));
        assert!(workflow.nodes()[1].config.is_empty());
        assert!(workflow.nodes().iter().all(|n| n.output.is_none()));
    }

    #[test]
    fn stored_output_serializes_without_node_id() {
        let mut workflow = Workflow::sequential().with_node(NodeDefinition::new("n1", "Echo"));
        workflow.find_node_mut("n1").unwrap().output =
            Some(NodeOutput::new(NodeStatus::Pass, json!({ "result": "ok" })));

        let value = serde_json::to_value(&workflow).unwrap();
        assert_eq!(
            value["workflow"]["nodes"][0]["output"],
            json!({ "status": "PASS", "data": { "result": "ok" } })
        );
        assert_eq!(value["workflow"]["executionStrategy"], json!("SEQUENTIAL"));
    }
}
