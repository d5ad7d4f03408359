use async_trait::async_trait;
use flowcore::{Config, Node, NodeContext, NodeError, NodeOutput};
use flowruntime::{NodeFactory, NodeMetadata};
use serde_json::json;
use std::time::Instant;
use tokio::time::{sleep, Duration};

const DEFAULT_DELAY_MS: u64 = 1000;

/// Delay execution for a specified duration
///
/// Config: `delay_ms` (default 1000) and `steps` (default 1). The delay is
/// split into `steps` slices with a progress event after each; an abort
/// request ends the wait early with an `ABORTED` result.
pub struct DelayNode;

#[async_trait]
impl Node for DelayNode {
    fn node_type(&self) -> &str {
        "time.delay"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let delay_ms = ctx
            .config()
            .get("delay_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_DELAY_MS);
        let steps = ctx
            .config()
            .get("steps")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
            .max(1);

        ctx.events.info(format!("Delaying for {}ms", delay_ms));
        let start = Instant::now();
        let slice = Duration::from_millis(delay_ms / steps);

        for step in 1..=steps {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    tracing::info!("Abort requested, ending delay after {}ms", elapsed_ms);
                    return Ok(NodeOutput::aborted(json!({
                        "message": "Aborted by shutdown",
                        "elapsed_ms": elapsed_ms,
                    })));
                }
                _ = sleep(slice) => {}
            }
            ctx.events
                .progress(step as f64 * 100.0 / steps as f64, None);
        }

        Ok(NodeOutput::pass(json!({ "delayed_ms": delay_ms })))
    }
}

pub struct DelayNodeFactory;

impl NodeFactory for DelayNodeFactory {
    fn create(&self, config: &Config) -> Result<Box<dyn Node>, NodeError> {
        match config.get("delay_ms") {
            Some(v) if v.as_u64().is_none() => Err(NodeError::InvalidConfigType {
                field: "delay_ms".to_string(),
                expected: "non-negative integer".to_string(),
            }),
            _ => Ok(Box::new(DelayNode)),
        }
    }

    fn node_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
        }
    }
}
