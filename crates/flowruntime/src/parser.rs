use crate::registry::NodeRegistry;
use flowcore::{FlowError, Workflow, WorkflowError};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Reads workflow documents and checks them against a registry
pub struct WorkflowParser {
    registry: Arc<NodeRegistry>,
}

impl WorkflowParser {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    pub async fn parse_file(&self, path: impl AsRef<Path>) -> Result<Workflow, FlowError> {
        let path = path.as_ref();
        tracing::info!("Parsing workflow definition from file: {}", path.display());
        let raw = tokio::fs::read_to_string(path).await?;
        self.parse_str(&raw)
    }

    pub fn parse_str(&self, json: &str) -> Result<Workflow, FlowError> {
        let workflow: Workflow = serde_json::from_str(json)
            .map_err(|e| FlowError::InvalidArgument(format!("Failed to parse workflow: {}", e)))?;
        self.validate(&workflow)?;
        Ok(workflow)
    }

    pub fn parse_value(&self, value: serde_json::Value) -> Result<Workflow, FlowError> {
        let workflow: Workflow = serde_json::from_value(value).map_err(|e| {
            FlowError::InvalidArgument(format!("Error mapping JSON to Workflow object: {}", e))
        })?;
        self.validate(&workflow)?;
        Ok(workflow)
    }

    /// Check for blank ids, unregistered types and duplicate ids
    pub fn validate(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();

        for node in workflow.nodes() {
            if node.id.trim().is_empty() {
                return Err(WorkflowError::MissingNodeId);
            }
            if !seen.insert(node.id.as_str()) && !duplicates.contains(&node.id) {
                duplicates.push(node.id.clone());
            }
            if !self.registry.contains(&node.node_type) {
                let message = format!("Invalid node type: {}", node.node_type);
                return Err(WorkflowError::Invalid(message));
            }
        }

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::DuplicateNodeIds(duplicates))
        }
    }

    pub fn serialize(&self, workflow: &Workflow, pretty: bool) -> Result<String, FlowError> {
        let json = if pretty {
            serde_json::to_string_pretty(workflow)?
        } else {
            serde_json::to_string(workflow)?
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowcore::{Node, NodeContext, NodeError, NodeOutput};
    use std::io::Write;

    struct Noop;

    #[async_trait]
    impl Node for Noop {
        fn node_type(&self) -> &str {
            "Noop"
        }

        async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
            Ok(NodeOutput::pass(serde_json::json!({})))
        }
    }

    fn parser() -> WorkflowParser {
        let mut registry = NodeRegistry::new();
        registry.register_fn("Noop", || Noop);
        WorkflowParser::new(Arc::new(registry))
    }

    fn doc(nodes: &str) -> String {
        format!(r#"{{ "workflow": {{ "executionStrategy": "SEQUENTIAL", "nodes": {nodes} }} }}"#)
    }

    #[test]
    fn accepts_a_valid_workflow() {
        let workflow = parser()
            .parse_str(&doc(r#"[{ "id": "a", "type": "Noop" }, { "id": "b", "type": "Noop" }]"#))
            .unwrap();
        assert_eq!(workflow.nodes().len(), 2);
    }

    #[test]
    fn rejects_blank_ids() {
        let err = parser().parse_str(&doc(r#"[{ "id": " ", "type": "Noop" }]"#)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Workflow error: Workflow contains a node with a missing nodeId."
        );
    }

    #[test]
    fn rejects_unknown_types() {
        let err = parser().parse_str(&doc(r#"[{ "id": "a", "type": "Ghost" }]"#)).unwrap_err();
        assert!(err.to_string().contains("Invalid node type: Ghost"));
    }

    #[test]
    fn reports_each_duplicate_once() {
        let err = parser()
            .parse_str(&doc(r#"[
                { "id": "a", "type": "Noop" },
                { "id": "a", "type": "Noop" },
                { "id": "a", "type": "Noop" }
            ]"#))
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Workflow(WorkflowError::DuplicateNodeIds(ref ids))
                if ids == &vec!["a".to_string()]
        ));
    }

    #[test]
    fn malformed_json_is_an_invalid_argument() {
        let err = parser().parse_str("{ not json").unwrap_err();
        assert!(matches!(err, FlowError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn parses_files_and_serializes_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let nodes = r#"[{ "id": "a", "type": "Noop", "config": { "k": 1 } }]"#;
        write!(file, "{}", doc(nodes)).unwrap();

        let parser = parser();
        let workflow = parser.parse_file(file.path()).await.unwrap();
        let compact = parser.serialize(&workflow, false).unwrap();
        let reparsed = parser.parse_str(&compact).unwrap();
        assert_eq!(reparsed, workflow);
        assert!(parser.serialize(&workflow, true).unwrap().contains('\n'));
    }
}
