//! # Execution Store
//!
//! Persistence boundary for workflow executions. The orchestrator needs only
//! `save`, `find_by_id` and `update`; the remaining queries serve operational
//! tooling. [`InMemoryExecutionStore`] is the bundled implementation.

pub mod memory;

pub use memory::InMemoryExecutionStore;

use crate::state_machine::{WorkflowExecution, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by an execution store
///
/// `Backend` carries the backend's own message untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),

    #[error("Execution already exists: {0}")]
    Duplicate(Uuid),

    #[error("Execution not found: {0}")]
    Missing(Uuid),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Query over stored executions; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFilter {
    pub statuses: Option<Vec<WorkflowStatus>>,
    pub workflow_name: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ExecutionFilter {
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = WorkflowStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = Some(name.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, execution: &WorkflowExecution) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&execution.current_status()) {
                return false;
            }
        }
        if let Some(name) = &self.workflow_name {
            if &execution.config().name != name {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if execution.context().user_id.as_ref() != Some(user_id) {
                return false;
            }
        }
        if let Some(session_id) = &self.session_id {
            if execution.context().session_id.as_ref() != Some(session_id) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if execution.created_at() < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if execution.created_at() > before {
                return false;
            }
        }
        true
    }
}

/// Persistence contract consumed by the orchestrator
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persist a new execution
    async fn save(&self, execution: &WorkflowExecution) -> StoreResult<()>;

    async fn find_by_id(&self, workflow_id: Uuid) -> StoreResult<Option<WorkflowExecution>>;

    /// Replace the stored snapshot of an existing execution
    async fn update(&self, execution: &WorkflowExecution) -> StoreResult<()>;

    /// Matching executions, newest first
    async fn find_by_filter(&self, filter: &ExecutionFilter) -> StoreResult<Vec<WorkflowExecution>>;

    async fn count_by_status(&self) -> StoreResult<HashMap<WorkflowStatus, usize>>;

    /// Move each listed execution to `status`, returning how many changed
    ///
    /// Executions that are missing or cannot legally reach `status` are left alone.
    async fn batch_update_status(&self, ids: &[Uuid], status: WorkflowStatus) -> StoreResult<usize>;

    /// Drop terminal executions last updated before `cutoff`, returning how many were removed
    async fn cleanup_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;

    /// Executions that have not reached a terminal status
    async fn find_active_executions(&self) -> StoreResult<Vec<WorkflowExecution>> {
        let filter = ExecutionFilter::default().with_statuses(
            WorkflowStatus::all()
                .into_iter()
                .filter(|status| !status.is_terminal()),
        );
        self.find_by_filter(&filter).await
    }

    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Vec<WorkflowExecution>> {
        self.find_by_filter(&ExecutionFilter::default().with_user(user_id))
            .await
    }

    async fn find_by_session_id(&self, session_id: &str) -> StoreResult<Vec<WorkflowExecution>> {
        self.find_by_filter(&ExecutionFilter::default().with_session(session_id))
            .await
    }
}
