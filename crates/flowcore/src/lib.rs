//! Core abstractions for the flow engine
//!
//! This crate provides the workflow document model, the node execution
//! contract and the error taxonomy that every other crate builds on. It
//! does not schedule anything itself.

mod error;
pub mod events;
mod node;
mod workflow;

pub use error::{FlowError, NodeError, WorkflowError};
pub use node::{Node, NodeContext, NodeInput, NodeOutput, NodeResult, NodeStatus};
pub use workflow::{
    ExecutionDetails, ExecutionStrategy, Metadata, NodeDefinition, NodeId, Workflow,
};
pub use events::*;

/// Opaque configuration mapping handed verbatim to a node
pub type Config = serde_json::Map<String, serde_json::Value>;
