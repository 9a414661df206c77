use super::{ExecutionFilter, ExecutionStore, StoreError, StoreResult};
use crate::state_machine::{WorkflowExecution, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Process-local execution store
///
/// Records live for the lifetime of the store; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutionStore {
    executions: Arc<RwLock<HashMap<Uuid, WorkflowExecution>>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.executions.read().await.is_empty()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        let mut executions = self.executions.write().await;
        let id = execution.workflow_id();
        if executions.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }
        executions.insert(id, execution.clone());
        debug!(workflow_id = %id, "Saved workflow execution");
        Ok(())
    }

    async fn find_by_id(&self, workflow_id: Uuid) -> StoreResult<Option<WorkflowExecution>> {
        Ok(self.executions.read().await.get(&workflow_id).cloned())
    }

    async fn update(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        let mut executions = self.executions.write().await;
        match executions.get_mut(&execution.workflow_id()) {
            Some(stored) => {
                *stored = execution.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(execution.workflow_id())),
        }
    }

    async fn find_by_filter(&self, filter: &ExecutionFilter) -> StoreResult<Vec<WorkflowExecution>> {
        let executions = self.executions.read().await;
        let mut matched: Vec<WorkflowExecution> = executions
            .values()
            .filter(|execution| filter.matches(execution))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn count_by_status(&self) -> StoreResult<HashMap<WorkflowStatus, usize>> {
        let executions = self.executions.read().await;
        let mut counts = HashMap::new();
        for execution in executions.values() {
            *counts.entry(execution.current_status()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn batch_update_status(&self, ids: &[Uuid], status: WorkflowStatus) -> StoreResult<usize> {
        let mut executions = self.executions.write().await;
        let mut updated = 0;
        for id in ids {
            let Some(execution) = executions.get_mut(id) else {
                continue;
            };
            match execution.transition_to(status) {
                Ok(_) => updated += 1,
                Err(err) => debug!(workflow_id = %id, error = %err, "Skipped batch status update"),
            }
        }
        Ok(updated)
    }

    async fn cleanup_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut executions = self.executions.write().await;
        let before = executions.len();
        executions.retain(|_, execution| !(execution.is_terminal() && execution.updated_at() < cutoff));
        Ok(before - executions.len())
    }
}
