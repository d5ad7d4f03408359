use async_trait::async_trait;
use flowcore::{Config, Node, NodeContext, NodeError, NodeOutput};
use flowruntime::{NodeFactory, NodeMetadata};
use serde_json::json;

/// Simple debug node that logs its config
pub struct DebugNode;

#[async_trait]
impl Node for DebugNode {
    fn node_type(&self) -> &str {
        "debug.log"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let message = ctx
            .config()
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)")
            .to_string();

        tracing::info!("DEBUG: {}", message);
        ctx.events.info(format!("DEBUG: {}", message));

        // Also log all config entries for visibility
        for (key, value) in ctx.config() {
            ctx.events.info(format!("  {}: {}", key, value));
        }

        Ok(NodeOutput::pass(json!({ "message": message })))
    }
}

pub struct DebugNodeFactory;

impl NodeFactory for DebugNodeFactory {
    fn create(&self, _config: &Config) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DebugNode))
    }

    fn node_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Logs config values for debugging".to_string(),
            category: "debug".to_string(),
        }
    }
}
