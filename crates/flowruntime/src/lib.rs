//! Workflow execution runtime
//!
//! This crate provides the engine that runs workflows sequentially or in
//! parallel on a tokio worker pool, the node registry, the thread-safe
//! workflow state store and the workflow parser.

mod executor;
mod parser;
mod registry;
mod runtime;
mod store;

pub use executor::{ExecutionHandle, ExecutionResult};
pub use parser::WorkflowParser;
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry};
pub use runtime::{EngineConfig, WorkflowEngine};
pub use store::{InMemoryStoreFactory, StoreFactory, WorkflowStore};
