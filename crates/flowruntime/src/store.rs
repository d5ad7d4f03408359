use flowcore::{
    ExecutionStrategy, FlowError, NodeDefinition, NodeOutput, NodeResult, Workflow,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Thread-safe holder of one loaded workflow and its node outputs.
///
/// Every write goes through [`WorkflowStore::merge`], serialized by a single
/// mutex, so concurrent completions can never interleave partial writes.
pub struct WorkflowStore {
    workflow: Mutex<Workflow>,
}

impl WorkflowStore {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow: Mutex::new(workflow),
        }
    }

    /// Write a completed node's output into its slot.
    ///
    /// The `nodeId` tag is dropped; only `{status, data}` is stored. A result
    /// whose id matches no definition is discarded without error.
    pub fn merge(&self, result: NodeResult) -> Result<(), FlowError> {
        if result.output.data.is_null() {
            return Err(FlowError::InvalidOutput(
                "'status' and 'data' fields are required.".to_string(),
            ));
        }
        let (node_id, output) = result.into_parts();

        let mut workflow = self.workflow.lock();
        match workflow.find_node_mut(&node_id) {
            Some(node) => {
                tracing::debug!("Merging {} output for node {}", output.status, node_id);
                node.output = Some(output);
            }
            None => {
                tracing::debug!("Discarding output for unknown node {}", node_id);
            }
        }
        Ok(())
    }

    /// Merge a raw `{"nodeId", "status", "data"}` document
    pub fn merge_value(&self, value: serde_json::Value) -> Result<(), FlowError> {
        self.merge(NodeResult::try_from(value)?)
    }

    /// Copy of the whole workflow, including partial progress mid-run
    pub fn snapshot(&self) -> Workflow {
        self.workflow.lock().clone()
    }

    pub fn output(&self, node_id: &str) -> Option<NodeOutput> {
        self.workflow
            .lock()
            .find_node(node_id)
            .and_then(|n| n.output.clone())
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.workflow.lock().strategy()
    }

    pub fn node_definitions(&self) -> Vec<NodeDefinition> {
        self.workflow.lock().nodes().to_vec()
    }

    /// Number of nodes with a populated output slot
    pub fn completed_count(&self) -> usize {
        self.workflow
            .lock()
            .nodes()
            .iter()
            .filter(|n| n.output.is_some())
            .count()
    }

    /// Empty every output slot ahead of a new run
    pub(crate) fn reset_outputs(&self) {
        let mut workflow = self.workflow.lock();
        for node in workflow.execution.nodes.iter_mut() {
            node.output = None;
        }
    }
}

/// Binds a fresh [`WorkflowStore`] to each newly loaded workflow
pub trait StoreFactory: Send + Sync {
    fn create(&self, workflow: Workflow) -> Result<Arc<WorkflowStore>, FlowError>;
}

/// Default factory: one in-memory store per workflow
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryStoreFactory;

impl StoreFactory for InMemoryStoreFactory {
    fn create(&self, workflow: Workflow) -> Result<Arc<WorkflowStore>, FlowError> {
        Ok(Arc::new(WorkflowStore::new(workflow)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore::{NodeStatus, Workflow};
    use serde_json::json;

    fn two_node_store() -> WorkflowStore {
        WorkflowStore::new(
            Workflow::parallel()
                .with_node(NodeDefinition::new("a", "Echo"))
                .with_node(NodeDefinition::new("b", "Echo")),
        )
    }

    #[test]
    fn merge_strips_the_tag_and_fills_the_slot() {
        let store = two_node_store();
        store
            .merge(NodeOutput::pass(json!({ "result": "ok" })).tagged("a"))
            .unwrap();

        let stored = serde_json::to_value(store.output("a").unwrap()).unwrap();
        assert_eq!(stored, json!({ "status": "PASS", "data": { "result": "ok" } }));
        assert!(store.output("b").is_none());
        assert_eq!(store.completed_count(), 1);
    }

    #[test]
    fn merge_for_unknown_id_is_a_no_op() {
        let store = two_node_store();
        store.merge(NodeOutput::pass(json!({})).tagged("ghost")).unwrap();
        assert_eq!(store.completed_count(), 0);
    }

    #[test]
    fn invalid_output_is_rejected_without_mutation() {
        let store = two_node_store();
        let err = store
            .merge(NodeOutput::pass(serde_json::Value::Null).tagged("a"))
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidOutput(_)));

        let err = store.merge_value(json!({ "nodeId": "b", "data": {} })).unwrap_err();
        assert!(matches!(err, FlowError::InvalidOutput(_)));
        assert_eq!(store.completed_count(), 0);
    }

    #[test]
    fn second_merge_for_same_id_wins() {
        let store = two_node_store();
        store.merge(NodeOutput::pass(json!({ "n": 1 })).tagged("a")).unwrap();
        store
            .merge(NodeOutput::aborted_with_message("late").tagged("a"))
            .unwrap();

        let out = store.output("a").unwrap();
        assert_eq!(out.status, NodeStatus::Aborted);
        assert_eq!(out.data, json!({ "message": "late" }));
    }

    #[test]
    fn concurrent_merges_do_not_corrupt_the_node_list() {
        let ids: Vec<String> = (0..32).map(|i| format!("n{i}")).collect();
        let mut workflow = Workflow::parallel();
        for id in &ids {
            workflow.add_node(NodeDefinition::new(id.clone(), "Echo"));
        }
        let store = Arc::new(WorkflowStore::new(workflow));

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .flat_map(|id| {
                (0..4).map(move |round| (id.clone(), round))
            })
            .map(|(id, round)| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let data =
                        json!({ "id": id, "round": round, "payload": [round, round, round] });
                    store.merge(NodeOutput::pass(data).tagged(id)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.nodes().len(), ids.len());
        for node in snapshot.nodes() {
            let out = node.output.as_ref().unwrap();
            assert_eq!(out.data["id"], json!(node.id));
            let round = out.data["round"].clone();
            assert_eq!(out.data["payload"], json!([round, round, round]));
        }
    }

    #[test]
    fn reset_clears_every_slot() {
        let store = two_node_store();
        store.merge(NodeOutput::pass(json!({})).tagged("a")).unwrap();
        store.merge(NodeOutput::error("x").tagged("b")).unwrap();
        store.reset_outputs();
        assert_eq!(store.completed_count(), 0);
    }

    #[test]
    fn factory_binds_a_separate_store_per_load() {
        let factory = InMemoryStoreFactory;
        let workflow = Workflow::sequential().with_node(NodeDefinition::new("a", "Echo"));
        let first = factory.create(workflow.clone()).unwrap();
        first.merge(NodeOutput::pass(json!({})).tagged("a")).unwrap();

        let second = factory.create(workflow).unwrap();
        assert!(second.output("a").is_none());
        assert!(first.output("a").is_some());
    }
}
