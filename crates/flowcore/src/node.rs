use crate::{events::EventEmitter, Config, FlowError, NodeError, NodeId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Core trait that all executable nodes implement
///
/// The registry builds a fresh instance for every dispatch, so an
/// implementation may keep per-run state in `self` without leaking it into
/// other executions of the same type.
#[async_trait]
pub trait Node: Send + Sync {
    /// Type identifier the node is registered under (e.g. "time.delay")
    fn node_type(&self) -> &str;

    /// Run the node to completion.
    ///
    /// Long-running implementations should watch `ctx.cancellation` at safe
    /// points. Returning `Err` is treated as a contained failure of this
    /// node only.
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;

    /// Cooperative abort hook. Called from the aborting thread right before
    /// the node's cancellation token fires; must not block.
    fn abort(&self) {}
}

/// Read-only input handed to a node at execution start
#[derive(Debug, Clone, Default)]
pub struct NodeInput {
    /// The node definition's config, verbatim
    pub config: Config,
    /// Reserved for inter-node data sharing; currently always empty
    pub context: Config,
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    pub input: NodeInput,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Fires when the engine requests a cooperative abort
    pub cancellation: CancellationToken,
}

impl NodeContext {
    pub fn new(config: Config, events: EventEmitter) -> Self {
        Self {
            input: NodeInput {
                config,
                context: Config::new(),
            },
            events,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.input.config
    }

    /// Get config value or return error
    pub fn require_config(&self, name: &str) -> Result<&serde_json::Value, NodeError> {
        self.input
            .config
            .get(name)
            .ok_or_else(|| NodeError::MissingConfig(name.to_string()))
    }

    /// Get a required string config value
    pub fn require_str(&self, name: &str) -> Result<&str, NodeError> {
        self.require_config(name)?
            .as_str()
            .ok_or_else(|| NodeError::InvalidConfigType {
                field: name.to_string(),
                expected: "string".to_string(),
            })
    }

    /// Get config with default
    pub fn get_config_or(&self, name: &str, default: serde_json::Value) -> serde_json::Value {
        self.input.config.get(name).cloned().unwrap_or(default)
    }
}

/// Terminal status of one node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    Pass,
    Fail,
    Aborted,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pass => f.write_str("PASS"),
            NodeStatus::Fail => f.write_str("FAIL"),
            NodeStatus::Aborted => f.write_str("ABORTED"),
        }
    }
}

/// Output produced by a node, and the value stored in its output slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub status: NodeStatus,
    pub data: serde_json::Value,
}

impl NodeOutput {
    pub fn new(status: NodeStatus, data: serde_json::Value) -> Self {
        Self { status, data }
    }

    pub fn pass(data: serde_json::Value) -> Self {
        Self::new(NodeStatus::Pass, data)
    }

    pub fn fail(data: serde_json::Value) -> Self {
        Self::new(NodeStatus::Fail, data)
    }

    pub fn aborted(data: serde_json::Value) -> Self {
        Self::new(NodeStatus::Aborted, data)
    }

    /// `FAIL` carrying `{"error": message}`
    pub fn error(message: impl Into<String>) -> Self {
        Self::fail(serde_json::json!({ "error": message.into() }))
    }

    /// `ABORTED` carrying `{"message": message}`
    pub fn aborted_with_message(message: impl Into<String>) -> Self {
        Self::aborted(serde_json::json!({ "message": message.into() }))
    }

    /// Attach the id of the node that produced this output
    pub fn tagged(self, node_id: impl Into<NodeId>) -> NodeResult {
        NodeResult {
            node_id: node_id.into(),
            output: self,
        }
    }
}

/// A node output tagged with the producing node's id.
///
/// The tag exists only between execution and merge; the store keeps the
/// bare [`NodeOutput`] under the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    #[serde(rename = "nodeId")]
    pub node_id: NodeId,
    #[serde(flatten)]
    pub output: NodeOutput,
}

impl NodeResult {
    pub fn into_parts(self) -> (NodeId, NodeOutput) {
        (self.node_id, self.output)
    }
}

impl TryFrom<serde_json::Value> for NodeResult {
    type Error = FlowError;

    /// Accepts `{"nodeId", "status", "data"}`; `status` and `data` must both
    /// be present and non-null.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let present = |field: &str| value.get(field).is_some_and(|v| !v.is_null());
        if !present("status") || !present("data") {
            return Err(FlowError::InvalidOutput(
                "'status' and 'data' fields are required.".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| FlowError::InvalidOutput(e.to_string()))
    }
}
