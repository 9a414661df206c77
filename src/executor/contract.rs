//! # Stage Executor Contract
//!
//! The trait every pluggable stage module implements, plus the input and output
//! records exchanged with it. Executors are selected by stage identifier; the
//! orchestrator never depends on a concrete implementation.

use crate::models::ExecutionContext;
use crate::state_machine::StageStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Output of a stage that completed before the current one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorStageOutput {
    pub stage: String,
    pub data: Option<Value>,
}

/// Input handed to [`StageExecutor::execute`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageInput {
    pub workflow_id: Uuid,
    pub stage: String,
    /// 1 for the first call, incremented on every retry
    pub attempt: u32,
    pub context: ExecutionContext,
    /// Outputs of earlier stages in completion order; always empty in parallel mode
    pub previous_results: Vec<PriorStageOutput>,
}

impl StageInput {
    /// Output of an earlier stage, if it completed
    pub fn previous(&self, stage: &str) -> Option<&PriorStageOutput> {
        self.previous_results.iter().find(|p| p.stage == stage)
    }
}

/// What an executor reports back for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl StageOutput {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// An expected failure with a human-readable description
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Self-description used for registration and status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorDescriptor {
    pub name: String,
    pub version: String,
    pub stage: String,
    pub description: String,
}

/// Ways a single stage call can fail
///
/// `Display` renders the underlying message untouched so callers can match on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("{0}")]
    Execution(String),

    #[error("Stage {stage} timed out after {timeout_ms}ms")]
    Timeout { stage: String, timeout_ms: u64 },

    #[error("Workflow timed out after {timeout_ms}ms")]
    WorkflowTimeout { timeout_ms: u64 },

    #[error("Stage executor panicked: {0}")]
    Panicked(String),
}

impl StageError {
    /// Stable machine-readable code recorded on the stage result
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Execution(_) => "STAGE_FAILED",
            Self::Timeout { .. } => "STAGE_TIMEOUT",
            Self::WorkflowTimeout { .. } => "WORKFLOW_TIMEOUT",
            Self::Panicked(_) => "STAGE_PANICKED",
        }
    }

    /// The overall workflow deadline is final; everything else goes through the retry policy
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::WorkflowTimeout { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::WorkflowTimeout { .. })
    }
}

/// A pluggable stage module
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Perform the stage's work
    ///
    /// Expected failures should be reported as `StageOutput { success: false, .. }`.
    /// An `Err` or a panic is treated the same way by the orchestrator.
    async fn execute(&self, input: StageInput) -> Result<StageOutput, StageError>;

    /// Liveness check independent of any run
    async fn status(&self) -> Result<StageStatus, StageError>;

    async fn health_check(&self) -> bool {
        true
    }

    fn describe(&self) -> ExecutorDescriptor;
}
