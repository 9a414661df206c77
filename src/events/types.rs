use crate::constants::events;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Lifecycle events published by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowCancelled,
    StageStarted,
    StageCompleted,
    StageFailed,
    StageRetrying,
    StageSkipped,
}

impl EventType {
    /// Dotted event name used as the listener key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowStarted => events::WORKFLOW_STARTED,
            Self::WorkflowCompleted => events::WORKFLOW_COMPLETED,
            Self::WorkflowFailed => events::WORKFLOW_FAILED,
            Self::WorkflowPaused => events::WORKFLOW_PAUSED,
            Self::WorkflowResumed => events::WORKFLOW_RESUMED,
            Self::WorkflowCancelled => events::WORKFLOW_CANCELLED,
            Self::StageStarted => events::STAGE_STARTED,
            Self::StageCompleted => events::STAGE_COMPLETED,
            Self::StageFailed => events::STAGE_FAILED,
            Self::StageRetrying => events::STAGE_RETRYING,
            Self::StageSkipped => events::STAGE_SKIPPED,
        }
    }

    pub fn is_stage_event(&self) -> bool {
        matches!(
            self,
            Self::StageStarted
                | Self::StageCompleted
                | Self::StageFailed
                | Self::StageRetrying
                | Self::StageSkipped
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub workflow_id: Uuid,
    pub stage: Option<String>,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl OrchestratorEvent {
    pub fn workflow(event_type: EventType, workflow_id: Uuid, data: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            workflow_id,
            stage: None,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn stage(
        event_type: EventType,
        workflow_id: Uuid,
        stage: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            stage: Some(stage.into()),
            ..Self::workflow(event_type, workflow_id, data)
        }
    }
}
