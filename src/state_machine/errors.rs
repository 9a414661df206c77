use super::states::{StageStatus, WorkflowStatus};
use thiserror::Error;

/// Errors raised by illegal workflow or stage transitions
///
/// A rejected transition never mutates the execution it was applied to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("cannot {action} in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: WorkflowStatus,
    },

    #[error("cannot {action} stage {stage}: workflow is in status {status}")]
    WorkflowNotInProgress {
        action: &'static str,
        stage: String,
        status: WorkflowStatus,
    },

    #[error("stage {stage} is not declared in the workflow configuration")]
    UnknownStage { stage: String },

    #[error("stage {stage} is already running")]
    StageAlreadyRunning { stage: String },

    #[error("stage {stage} is already {status}")]
    StageAlreadyResolved { stage: String, status: StageStatus },

    #[error("stage {stage} is not running (current: {current})")]
    StageNotRunning { stage: String, current: String },

    #[error("retry limit reached ({retry_count} of {max_attempts})")]
    RetryLimitReached { retry_count: u32, max_attempts: u32 },

    #[error("no retry policy configured")]
    NoRetryPolicy,

    #[error("cannot transition to status {target}")]
    UnreachableStatus { target: WorkflowStatus },
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;
