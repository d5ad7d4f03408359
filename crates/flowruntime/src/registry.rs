use flowcore::{Config, Node, NodeError, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a new, isolated instance of the node for one dispatch
    fn create(&self, config: &Config) -> Result<Box<dyn Node>, NodeError>;

    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Optional: Get node metadata (description, category)
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Adapts a closure into a [`NodeFactory`]
struct FnNodeFactory<F> {
    node_type: String,
    build: F,
}

impl<F, N> NodeFactory for FnNodeFactory<F>
where
    F: Fn() -> N + Send + Sync,
    N: Node + 'static,
{
    fn create(&self, _config: &Config) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new((self.build)()))
    }

    fn node_type(&self) -> &str {
        &self.node_type
    }
}

/// Registry of available node types
///
/// Built once with an explicit table of factories and then shared
/// read-only behind an `Arc`.
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory, replacing any previous one for the same type
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::info!("Registering node type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    /// Register a type whose instances are built by a closure
    pub fn register_fn<F, N>(&mut self, node_type: impl Into<String>, build: F)
    where
        F: Fn() -> N + Send + Sync + 'static,
        N: Node + 'static,
    {
        self.register(Arc::new(FnNodeFactory {
            node_type: node_type.into(),
            build,
        }));
    }

    /// Look up the factory for a type.
    pub fn resolve(&self, node_type: &str) -> Result<&Arc<dyn NodeFactory>, WorkflowError> {
        self.factories
            .get(node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))
    }

    /// Resolve a type and build a fresh instance for the given config.
    ///
    /// The outer error is the scheduling tier (type unknown); the inner one
    /// is the factory rejecting this node's config.
    pub fn create_node(
        &self,
        node_type: &str,
        config: &Config,
    ) -> Result<Result<Arc<dyn Node>, NodeError>, WorkflowError> {
        let factory = self.resolve(node_type)?;
        Ok(factory.create(config).map(Arc::from))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.factories.get(node_type).map(|f| f.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
