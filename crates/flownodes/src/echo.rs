use async_trait::async_trait;
use flowcore::{Config, Node, NodeContext, NodeError, NodeOutput};
use flowruntime::{NodeFactory, NodeMetadata};
use serde_json::json;

/// Returns `{"result": <config.message>}`, or `"ok"` without a message
pub struct EchoNode;

#[async_trait]
impl Node for EchoNode {
    fn node_type(&self) -> &str {
        "Echo"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let result = ctx.get_config_or("message", json!("ok"));
        Ok(NodeOutput::pass(json!({ "result": result })))
    }
}

pub struct EchoNodeFactory;

impl NodeFactory for EchoNodeFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(EchoNode))
    }

    fn node_type(&self) -> &str {
        "Echo"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Echo the configured message back as the result".to_string(),
            category: "debug".to_string(),
        }
    }
}
