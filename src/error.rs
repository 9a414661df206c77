//! Top-level orchestrator errors.
//!
//! Every variant that carries a message from an executor, a store or the state
//! machine renders that message verbatim.

use crate::config::ConfigurationError;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// Rejected before anything was persisted
    #[error("Invalid workflow configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// Admission cap reached; nothing was persisted
    #[error("Maximum concurrent executions reached ({limit})")]
    CapacityExceeded { limit: usize },

    /// The run ended in `failed`; `message` is the underlying error text
    #[error("{message}")]
    WorkflowFailed {
        workflow_id: Option<Uuid>,
        stage: Option<String>,
        message: String,
    },

    #[error("Workflow was cancelled: {workflow_id}")]
    WorkflowCancelled { workflow_id: Uuid },

    #[error("Workflow not found or not active: {workflow_id}")]
    NotActive { workflow_id: Uuid },

    #[error("Workflow not found: {workflow_id}")]
    NotFound { workflow_id: Uuid },

    #[error("{0}")]
    StateMachine(#[from] StateMachineError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A broken invariant inside the orchestrator
    #[error("Internal orchestrator error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn workflow_failed(
        workflow_id: Option<Uuid>,
        stage: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::WorkflowFailed {
            workflow_id,
            stage,
            message: message.into(),
        }
    }

    /// Workflow the error refers to, when known
    pub fn workflow_id(&self) -> Option<Uuid> {
        match self {
            Self::WorkflowFailed { workflow_id, .. } => *workflow_id,
            Self::WorkflowCancelled { workflow_id }
            | Self::NotActive { workflow_id }
            | Self::NotFound { workflow_id } => Some(*workflow_id),
            _ => None,
        }
    }

    /// Rejected at submission time, before any state was created
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. } | Self::CapacityExceeded { .. }
        )
    }
}

impl From<ConfigurationError> for OrchestratorError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = anyhow::Result<T, OrchestratorError>;
