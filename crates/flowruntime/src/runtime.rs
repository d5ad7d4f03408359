use crate::executor::{ExecutionHandle, RunState, WorkflowExecutor};
use crate::registry::NodeRegistry;
use crate::store::{InMemoryStoreFactory, StoreFactory, WorkflowStore};
use chrono::Utc;
use flowcore::{EventBus, ExecutionEvent, FlowError, NodeId, NodeOutput, NodeStatus, Workflow};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};

/// In-memory workflow engine.
///
/// Holds at most one loaded workflow and runs it on a tokio worker pool,
/// either one node at a time or all nodes at once:
///
/// ```text
/// Unloaded --load--> Loaded --execute_async--> Running --drained--> Loaded --eject--> Unloaded
/// ```
pub struct WorkflowEngine {
    registry: Arc<NodeRegistry>,
    store_factory: Arc<dyn StoreFactory>,
    pool: Handle,
    config: EngineConfig,
    event_bus: Arc<EventBus>,
    store: Mutex<Option<Arc<WorkflowStore>>>,
    run: Mutex<Option<Arc<RunState>>>,
}

impl WorkflowEngine {
    /// Create an engine with every collaborator injected
    pub fn new(
        registry: Arc<NodeRegistry>,
        store_factory: Arc<dyn StoreFactory>,
        pool: Handle,
        config: EngineConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self {
            registry,
            store_factory,
            pool,
            config,
            event_bus,
            store: Mutex::new(None),
            run: Mutex::new(None),
        }
    }

    /// Create an engine on the current tokio runtime with in-memory stores
    pub fn with_registry(
        registry: Arc<NodeRegistry>,
        config: EngineConfig,
    ) -> Result<Self, FlowError> {
        let pool = Handle::try_current()
            .map_err(|e| FlowError::IllegalState(format!("No worker pool available: {}", e)))?;
        Ok(Self::new(registry, Arc::new(InMemoryStoreFactory), pool, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bind a fresh state store to `workflow`, replacing any previous one
    pub fn load(&self, workflow: Workflow) -> Result<(), FlowError> {
        if self.is_running() {
            return Err(FlowError::IllegalState(
                "Cannot load a workflow while a run is in progress.".to_string(),
            ));
        }
        tracing::info!("Loading new workflow with {} nodes.", workflow.nodes().len());
        let store = self.store_factory.create(workflow)?;
        *self.store.lock() = Some(store);
        Ok(())
    }

    pub fn eject(&self) -> Result<(), FlowError> {
        if self.is_running() {
            return Err(FlowError::IllegalState(
                "Cannot eject a workflow while a run is in progress.".to_string(),
            ));
        }
        let mut store = self.store.lock();
        if store.is_none() {
            return Err(FlowError::IllegalState(
                "No workflow is currently loaded to eject.".to_string(),
            ));
        }
        tracing::info!("Ejecting current workflow.");
        *store = None;
        Ok(())
    }

    /// Start running the loaded workflow without blocking the caller.
    ///
    /// Clears the previous run's outputs and cancellation flag. The
    /// returned handle fails only for scheduling faults such as an unknown
    /// node type; per-node failures are recorded in the store.
    pub fn execute_async(&self) -> Result<ExecutionHandle, FlowError> {
        let store = self.bound_store("No workflow is loaded. Load a workflow before execution.")?;

        let mut current = self.run.lock();
        if current.as_ref().is_some_and(|run| run.is_running()) {
            return Err(FlowError::IllegalState(
                "A workflow run is already in progress.".to_string(),
            ));
        }
        let run = Arc::new(RunState::new());
        *current = Some(run.clone());
        drop(current);

        store.reset_outputs();
        let strategy = store.strategy();
        let nodes = store.node_definitions();
        let execution_id = run.execution_id;
        tracing::info!(%execution_id, "Starting workflow execution asynchronously.");

        let executor = WorkflowExecutor {
            registry: self.registry.clone(),
            store,
            events: self.event_bus.clone(),
            run,
            pool: self.pool.clone(),
        };
        let task = self.pool.spawn(executor.execute(strategy, nodes));
        Ok(ExecutionHandle::new(execution_id, task))
    }

    /// Cancel the current run.
    ///
    /// Stops further dispatch, then asks every in-flight node to abort and
    /// waits up to the abort timeout for each. A node that does not finish
    /// in time is recorded as `ABORTED` and left behind.
    pub async fn abort(&self) -> Result<(), FlowError> {
        let store = self.bound_store("No workflow is loaded to abort.")?;
        tracing::info!("Aborting workflow execution.");

        let run = match self.run.lock().clone() {
            Some(run) => run,
            None => return Ok(()),
        };
        run.cancel.cancel();

        let timeout = self.config.abort_timeout();

        // Dispatch re-checks the token after registering a node, so once
        // the token is set the in-flight set only shrinks.
        loop {
            let in_flight: Vec<_> = run
                .in_flight
                .iter()
                .map(|entry| (*entry.key(), entry.value().clone()))
                .collect();
            if in_flight.is_empty() {
                break;
            }

            for (key, node) in in_flight {
                tracing::info!("Aborting node: {}", node.node_id);
                node.node.abort();
                node.cancellation.cancel();

                if tokio::time::timeout(timeout, node.finished.cancelled()).await.is_err() {
                    tracing::warn!(
                        "Node {} did not shut down within {} ms.",
                        node.node_id,
                        timeout.as_millis()
                    );
                    if node.settle() {
                        let message = format!("Node {} failed to shut down in time.", node.node_id);
                        let forced = NodeOutput::aborted_with_message(message.clone());
                        store.merge(forced.tagged(node.node_id.clone()))?;
                        run.tally.record(NodeStatus::Aborted);
                        self.event_bus.emit(ExecutionEvent::NodeAborted {
                            execution_id: run.execution_id,
                            node_id: node.node_id.clone(),
                            reason: message,
                            timestamp: Utc::now(),
                        });
                    }
                    node.abandoned.cancel();
                }
                run.in_flight.remove(&key);
            }
        }
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.store.lock().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().as_ref().is_some_and(|run| run.is_running())
    }

    /// The store bound to the loaded workflow, readable at any time
    pub fn store(&self) -> Option<Arc<WorkflowStore>> {
        self.store.lock().clone()
    }

    /// Ids of the nodes currently tracked as running
    pub fn in_flight(&self) -> Vec<NodeId> {
        self.run
            .lock()
            .as_ref()
            .map(|run| run.in_flight_ids())
            .unwrap_or_default()
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    fn bound_store(&self, message: &str) -> Result<Arc<WorkflowStore>, FlowError> {
        self.store
            .lock()
            .clone()
            .ok_or_else(|| FlowError::IllegalState(message.to_string()))
    }
}

/// Configuration for the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads of the pool built by [`EngineConfig::build_pool`]
    pub worker_threads: usize,
    /// How long `abort` waits for each in-flight node
    pub abort_timeout_ms: u64,
    pub event_buffer_size: usize,
}

impl EngineConfig {
    pub fn abort_timeout(&self) -> Duration {
        Duration::from_millis(self.abort_timeout_ms)
    }

    /// Load a JSON config file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Build the multi-threaded worker pool sized by `worker_threads`
    pub fn build_pool(&self) -> std::io::Result<Runtime> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.worker_threads.max(1))
            .thread_name("flow-worker")
            .enable_all()
            .build()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            abort_timeout_ms: 5000,
            event_buffer_size: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{ "abort_timeout_ms": 250 }"#).unwrap();
        assert_eq!(config.abort_timeout(), Duration::from_millis(250));
        assert_eq!(config.event_buffer_size, 1000);
        assert_eq!(config.worker_threads, num_cpus::get());
    }

    #[test]
    fn config_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "worker_threads": 2 }}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.abort_timeout_ms, 5000);
    }

    #[test]
    fn built_pool_runs_tasks() {
        let config = EngineConfig {
            worker_threads: 1,
            ..EngineConfig::default()
        };
        let pool = config.build_pool().unwrap();
        assert_eq!(pool.block_on(async { 40 + 2 }), 42);
    }

    #[test]
    fn engine_requires_a_pool() {
        let registry = Arc::new(NodeRegistry::new());
        let err = WorkflowEngine::with_registry(registry, EngineConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::IllegalState(_)));
    }
}
