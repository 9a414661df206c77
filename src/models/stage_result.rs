use crate::state_machine::StageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recorded outcome of one stage within a workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Executor payload on success, skip reason on skip
    pub result: Option<Value>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    /// Number of times the stage was started
    pub attempts: u32,
}

impl StageResult {
    pub fn pending(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Pending,
            started_at: None,
            ended_at: None,
            result: None,
            error: None,
            error_code: None,
            attempts: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Completed
    }

    pub fn is_failure(&self) -> bool {
        self.status == StageStatus::Failed
    }

    /// Elapsed milliseconds between start and end, when both are known
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}
