use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid node output: {0}")]
    InvalidOutput(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// True for the scheduling tier: defects that halt a whole run
    pub fn is_scheduling_failure(&self) -> bool {
        matches!(self, FlowError::Workflow(WorkflowError::UnknownNodeType(_)))
    }
}

/// Errors raised by a node's own execution. The engine contains these and
/// records them as a `FAIL` result for that node only.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("Invalid config type for '{field}': expected {expected}")]
    InvalidConfigType {
        field: String,
        expected: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Workflow contains a node with a missing nodeId.")]
    MissingNodeId,

    #[error("Workflow contains duplicate nodeIds: {}", .0.join(", "))]
    DuplicateNodeIds(Vec<String>),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
}
