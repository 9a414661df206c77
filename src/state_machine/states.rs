use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Initial state when the execution is submitted
    Created,
    /// Stages are being driven
    InProgress,
    /// Advisory pause; no new stage is started until resumed
    Paused,
    /// All stages completed successfully
    Completed,
    /// A stage failed after exhausting retries, or persistence failed
    Failed,
    /// Cancelled by a control operation
    Cancelled,
}

impl WorkflowStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the workflow is currently tracked as running work
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::Paused)
    }

    /// All statuses, in lifecycle order
    pub fn all() -> [WorkflowStatus; 6] {
        [
            Self::Created,
            Self::InProgress,
            Self::Paused,
            Self::Completed,
            Self::Failed,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid workflow status: {s}")),
        }
    }
}

/// Per-stage status, also used by executors to report liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Check if the stage reached an outcome
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Completed or skipped stages never run again within a workflow
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Invalid stage status: {s}")),
        }
    }
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_status_terminal_check() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::Created.is_terminal());
        assert!(!WorkflowStatus::InProgress.is_terminal());
        assert!(!WorkflowStatus::Paused.is_terminal());
    }

    #[test]
    fn test_stage_status_resolution() {
        assert!(StageStatus::Completed.is_resolved());
        assert!(StageStatus::Skipped.is_resolved());
        assert!(!StageStatus::Failed.is_resolved());
        assert!(StageStatus::Failed.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(WorkflowStatus::InProgress.to_string(), "in_progress");
        assert_eq!(
            "cancelled".parse::<WorkflowStatus>().unwrap(),
            WorkflowStatus::Cancelled
        );
        assert!("done".parse::<WorkflowStatus>().is_err());

        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
        assert_eq!("running".parse::<StageStatus>().unwrap(), StageStatus::Running);
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&WorkflowStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");

        let parsed: StageStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, StageStatus::Failed);
    }
}
