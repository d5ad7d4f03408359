use crate::registry::NodeRegistry;
use crate::store::WorkflowStore;
use chrono::Utc;
use dashmap::DashMap;
use flowcore::{
    Config, EventBus, ExecutionEvent, ExecutionId, ExecutionStrategy, FlowError, Node,
    NodeContext, NodeDefinition, NodeError, NodeId, NodeInput, NodeOutput, NodeStatus,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One dispatched node that has not been settled yet
pub(crate) struct InFlight {
    pub(crate) node_id: NodeId,
    pub(crate) node: Arc<dyn Node>,
    pub(crate) cancellation: CancellationToken,
    /// Fires once the completion path has merged (or skipped) the result
    pub(crate) finished: CancellationToken,
    /// Fires when an abort gave up on the node and recorded `ABORTED`
    pub(crate) abandoned: CancellationToken,
    settled: AtomicBool,
}

impl InFlight {
    /// Claim the node's output slot for this run. Only the first caller
    /// (normal completion or forced abort) gets to merge.
    pub(crate) fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tally {
    dispatched: AtomicUsize,
    passed: AtomicUsize,
    failed: AtomicUsize,
    pub(crate) aborted: AtomicUsize,
}

impl Tally {
    pub(crate) fn record(&self, status: NodeStatus) {
        let counter = match status {
            NodeStatus::Pass => &self.passed,
            NodeStatus::Fail => &self.failed,
            NodeStatus::Aborted => &self.aborted,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Shared state of one execution run, visible to both the orchestration
/// task and an aborting caller.
pub(crate) struct RunState {
    pub(crate) execution_id: ExecutionId,
    pub(crate) cancel: CancellationToken,
    pub(crate) in_flight: DashMap<Uuid, Arc<InFlight>>,
    pub(crate) tally: Tally,
    running: AtomicBool,
}

impl RunState {
    pub(crate) fn new() -> Self {
        Self {
            execution_id: ExecutionId::new_v4(),
            cancel: CancellationToken::new(),
            in_flight: DashMap::new(),
            tally: Tally::default(),
            running: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .in_flight
            .iter()
            .map(|entry| entry.value().node_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Clears the running flag even if the orchestration task unwinds
struct RunningGuard(Arc<RunState>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

enum Dispatched {
    /// An abort arrived while the node was being built; nothing is recorded
    Skipped(NodeId),
    /// The factory refused to build the node; contained as a failure
    Rejected {
        node_id: NodeId,
        error: NodeError,
    },
    Running {
        key: Uuid,
        entry: Arc<InFlight>,
        task: JoinHandle<Result<NodeOutput, NodeError>>,
        started: Instant,
    },
}

/// Everything the orchestration task needs, cheap to clone into node tasks
#[derive(Clone)]
pub(crate) struct WorkflowExecutor {
    pub(crate) registry: Arc<NodeRegistry>,
    pub(crate) store: Arc<WorkflowStore>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) run: Arc<RunState>,
    pub(crate) pool: Handle,
}

impl WorkflowExecutor {
    /// Run every node of the workflow under the given strategy
    pub(crate) async fn execute(
        self,
        strategy: ExecutionStrategy,
        nodes: Vec<NodeDefinition>,
    ) -> Result<ExecutionResult, FlowError> {
        let _guard = RunningGuard(self.run.clone());
        let execution_id = self.run.execution_id;
        let start_time = Instant::now();

        self.events.emit(ExecutionEvent::RunStarted {
            execution_id,
            strategy,
            node_count: nodes.len(),
            timestamp: Utc::now(),
        });
        tracing::info!(
            %execution_id,
            "Starting {} workflow execution of {} nodes",
            strategy,
            nodes.len()
        );

        let outcome = match strategy {
            ExecutionStrategy::Sequential => self.execute_sequential(&nodes).await,
            ExecutionStrategy::Parallel => self.execute_parallel(&nodes).await,
        };

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let cancelled = self.run.cancel.is_cancelled();
        self.events.emit(ExecutionEvent::RunCompleted {
            execution_id,
            success: outcome.is_ok(),
            cancelled,
            duration_ms,
            timestamp: Utc::now(),
        });

        match &outcome {
            Ok(()) => {
                tracing::info!(%execution_id, "Workflow execution completed in {}ms", duration_ms)
            }
            Err(e) => tracing::error!(%execution_id, "Workflow execution failed: {}", e),
        }

        outcome.map(|()| {
            let tally = &self.run.tally;
            ExecutionResult {
                execution_id,
                total_nodes: nodes.len(),
                dispatched: tally.dispatched.load(Ordering::SeqCst),
                passed: tally.passed.load(Ordering::SeqCst),
                failed: tally.failed.load(Ordering::SeqCst),
                aborted: tally.aborted.load(Ordering::SeqCst),
                cancelled,
                duration_ms,
            }
        })
    }

    async fn execute_sequential(&self, nodes: &[NodeDefinition]) -> Result<(), FlowError> {
        for (index, node_def) in nodes.iter().enumerate() {
            if self.run.cancel.is_cancelled() {
                let remaining = nodes.len() - index;
                tracing::info!("Cancellation requested, skipping remaining {} nodes", remaining);
                break;
            }
            let dispatched = self.dispatch(node_def)?;
            self.complete(dispatched).await;
        }
        Ok(())
    }

    async fn execute_parallel(&self, nodes: &[NodeDefinition]) -> Result<(), FlowError> {
        let mut running = JoinSet::new();
        let mut fatal = None;

        for node_def in nodes {
            if self.run.cancel.is_cancelled() {
                tracing::info!("Cancellation requested, halting dispatch");
                break;
            }
            match self.dispatch(node_def) {
                Ok(dispatched) => {
                    let executor = self.clone();
                    let completion = async move { executor.complete(dispatched).await };
                    running.spawn_on(completion, &self.pool);
                }
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }
        }

        // Already-dispatched nodes drain even after a scheduling failure
        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Node completion task failed: {}", e);
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolve the node's type, register it as in flight and start it on
    /// the pool. Only an unknown type is returned as an error.
    fn dispatch(&self, node_def: &NodeDefinition) -> Result<Dispatched, FlowError> {
        let created = self
            .registry
            .create_node(&node_def.node_type, &node_def.config)
            .map_err(|e| {
                tracing::error!("Cannot schedule node {}: {}", node_def.id, e);
                FlowError::from(e)
            })?;

        let node = match created {
            Ok(node) => node,
            Err(_) if self.run.cancel.is_cancelled() => {
                return Ok(Dispatched::Skipped(node_def.id.clone()));
            }
            Err(error) => {
                self.run.tally.dispatched.fetch_add(1, Ordering::SeqCst);
                return Ok(Dispatched::Rejected {
                    node_id: node_def.id.clone(),
                    error,
                });
            }
        };

        // A child token also catches an abort that lands after the check
        // below, before the node task observes its context.
        let cancellation = self.run.cancel.child_token();
        let entry = Arc::new(InFlight {
            node_id: node_def.id.clone(),
            node: node.clone(),
            cancellation: cancellation.clone(),
            finished: CancellationToken::new(),
            abandoned: CancellationToken::new(),
            settled: AtomicBool::new(false),
        });
        let key = Uuid::new_v4();
        self.run.in_flight.insert(key, entry.clone());

        // Registered first: either an abort's snapshot sees this entry, or
        // this check sees the abort.
        if self.run.cancel.is_cancelled() {
            self.run.in_flight.remove(&key);
            entry.finished.cancel();
            return Ok(Dispatched::Skipped(node_def.id.clone()));
        }
        self.run.tally.dispatched.fetch_add(1, Ordering::SeqCst);

        tracing::info!("Executing node: {} of type: {}", node_def.id, node_def.node_type);
        self.events.emit(ExecutionEvent::NodeStarted {
            execution_id: self.run.execution_id,
            node_id: node_def.id.clone(),
            node_type: node_def.node_type.clone(),
            timestamp: Utc::now(),
        });

        let ctx = NodeContext {
            input: NodeInput {
                config: node_def.config.clone(),
                context: Config::new(),
            },
            events: self.events.create_emitter(self.run.execution_id, node_def.id.clone()),
            cancellation,
        };
        let task = self.pool.spawn(async move { node.execute(ctx).await });

        Ok(Dispatched::Running {
            key,
            entry,
            task,
            started: Instant::now(),
        })
    }

    /// Wait for a dispatched node and merge whatever it produced
    async fn complete(&self, dispatched: Dispatched) -> Option<NodeStatus> {
        match dispatched {
            Dispatched::Skipped(node_id) => {
                tracing::info!("Cancellation requested, node {} was not started", node_id);
                None
            }
            Dispatched::Rejected { node_id, error } => {
                tracing::error!("Error creating node {}: {}", node_id, error);
                Some(self.record(node_id, Err(error.to_string()), 0))
            }
            Dispatched::Running {
                key,
                entry,
                mut task,
                started,
            } => {
                let joined = tokio::select! {
                    joined = &mut task => Some(joined),
                    _ = entry.abandoned.cancelled() => None,
                };

                let status = match joined {
                    None => {
                        tracing::debug!("Node {} was abandoned after abort", entry.node_id);
                        None
                    }
                    Some(joined) => {
                        let outcome = match joined {
                            Ok(Ok(output)) => Ok(output),
                            Ok(Err(NodeError::ExecutionFailed(message))) => Err(message),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(e) if e.is_panic() => Err("Node execution panicked".to_string()),
                            Err(e) => Err(e.to_string()),
                        };
                        let duration_ms = started.elapsed().as_millis() as u64;
                        if entry.settle() {
                            Some(self.record(entry.node_id.clone(), outcome, duration_ms))
                        } else {
                            tracing::debug!("Discarding late result of node {}", entry.node_id);
                            None
                        }
                    }
                };

                self.run.in_flight.remove(&key);
                entry.finished.cancel();
                status
            }
        }
    }

    /// Merge one node's outcome. Execution errors and outputs the store
    /// rejects both become a `FAIL` result carrying the error message.
    fn record(
        &self,
        node_id: NodeId,
        outcome: Result<NodeOutput, String>,
        duration_ms: u64,
    ) -> NodeStatus {
        let execution_id = self.run.execution_id;
        let output = match outcome {
            Ok(output) => {
                let status = output.status;
                self.store
                    .merge(output.tagged(node_id.clone()))
                    .map(|()| status)
                    .map_err(|e| e.to_string())
            }
            Err(message) => Err(message),
        };

        let status = match output {
            Ok(status) => status,
            Err(message) => {
                tracing::error!("Error executing node {}: {}", node_id, message);
                self.events.emit(ExecutionEvent::NodeFailed {
                    execution_id,
                    node_id: node_id.clone(),
                    error: message.clone(),
                    timestamp: Utc::now(),
                });
                let failure = NodeOutput::error(message).tagged(node_id.clone());
                if let Err(e) = self.store.merge(failure) {
                    tracing::error!("Failed to record failure of node {}: {}", node_id, e);
                }
                NodeStatus::Fail
            }
        };

        tracing::info!("Node {} finished with {} in {}ms", node_id, status, duration_ms);
        self.run.tally.record(status);
        self.events.emit(ExecutionEvent::NodeCompleted {
            execution_id,
            node_id,
            status,
            duration_ms,
            timestamp: Utc::now(),
        });
        status
    }
}

/// Result of workflow execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub total_nodes: usize,
    pub dispatched: usize,
    pub passed: usize,
    pub failed: usize,
    pub aborted: usize,
    /// An abort was requested during the run
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Handle for an asynchronous run; resolves when the whole run has drained
pub struct ExecutionHandle {
    pub execution_id: ExecutionId,
    task: JoinHandle<Result<ExecutionResult, FlowError>>,
}

impl ExecutionHandle {
    pub(crate) fn new(
        execution_id: ExecutionId,
        task: JoinHandle<Result<ExecutionResult, FlowError>>,
    ) -> Self {
        Self { execution_id, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for ExecutionHandle {
    type Output = Result<ExecutionResult, FlowError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(FlowError::Execution(format!("Task join error: {}", e))),
        })
    }
}
