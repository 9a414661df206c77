//! # Workflow Execution
//!
//! The aggregate for one orchestration run. All mutation goes through the lifecycle
//! and per-stage operations below, each of which validates the transition first and
//! leaves the execution untouched when it is rejected.

use super::errors::{StateMachineError, StateMachineResult};
use super::events::LifecycleEvent;
use super::states::{StageStatus, WorkflowStatus};
use crate::models::{ExecutionContext, StageResult, WorkflowConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Message recorded when a failure is applied through [`WorkflowExecution::transition_to`]
const BATCH_FAILURE_MESSAGE: &str = "status updated by batch operation";

/// Live status of a workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub current_stage: Option<String>,
    pub completed_stages: Vec<String>,
    pub stage_results: HashMap<String, StageResult>,
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl ExecutionStatus {
    fn new(workflow_id: Uuid) -> Self {
        Self {
            workflow_id,
            status: WorkflowStatus::Created,
            current_stage: None,
            completed_stages: Vec::new(),
            stage_results: HashMap::new(),
            retry_count: 0,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn stage_result(&self, stage: &str) -> Option<&StageResult> {
        self.stage_results.get(stage)
    }

    pub fn stage_status(&self, stage: &str) -> Option<StageStatus> {
        self.stage_results.get(stage).map(|r| r.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One orchestration run: configuration, caller context and live status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    workflow_id: Uuid,
    orchestrator_id: Uuid,
    config: WorkflowConfig,
    context: ExecutionContext,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    status: ExecutionStatus,
}

impl WorkflowExecution {
    /// Create a new execution in status `created`
    pub fn new(orchestrator_id: Uuid, config: WorkflowConfig, context: ExecutionContext) -> Self {
        let workflow_id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            workflow_id,
            orchestrator_id,
            config,
            context,
            created_at: now,
            updated_at: now,
            status: ExecutionStatus::new(workflow_id),
        }
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn orchestrator_id(&self) -> Uuid {
        self.orchestrator_id
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn status(&self) -> &ExecutionStatus {
        &self.status
    }

    pub fn current_status(&self) -> WorkflowStatus {
        self.status.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.status.is_terminal()
    }

    /// Elapsed run time, defined once the execution is terminal
    pub fn duration(&self) -> Option<Duration> {
        self.status.duration_ms.map(Duration::from_millis)
    }

    pub fn start(&mut self) -> StateMachineResult<WorkflowStatus> {
        self.apply(LifecycleEvent::Start)
    }

    pub fn pause(&mut self) -> StateMachineResult<WorkflowStatus> {
        self.apply(LifecycleEvent::Pause)
    }

    pub fn resume(&mut self) -> StateMachineResult<WorkflowStatus> {
        self.apply(LifecycleEvent::Resume)
    }

    pub fn complete(&mut self) -> StateMachineResult<WorkflowStatus> {
        self.apply(LifecycleEvent::Complete)
    }

    pub fn fail(&mut self, error: impl Into<String>) -> StateMachineResult<WorkflowStatus> {
        self.apply(LifecycleEvent::fail_with_error(error))
    }

    pub fn cancel(&mut self) -> StateMachineResult<WorkflowStatus> {
        self.apply(LifecycleEvent::Cancel)
    }

    /// Apply a lifecycle event, recording timestamps and the failure message
    pub fn apply(&mut self, event: LifecycleEvent) -> StateMachineResult<WorkflowStatus> {
        let target = Self::determine_target_state(self.status.status, &event)?;
        let now = Utc::now();

        if event == LifecycleEvent::Start {
            self.status.started_at = Some(now);
        }
        if let Some(message) = event.error_message() {
            self.status.error = Some(message.to_string());
        }
        if target.is_terminal() {
            let started = self.status.started_at.unwrap_or(self.created_at);
            self.status.ended_at = Some(now);
            self.status.duration_ms = Some((now - started).num_milliseconds().max(0) as u64);
        }

        self.status.status = target;
        self.updated_at = now;
        Ok(target)
    }

    /// Determine the target status for an event, rejecting anything the lifecycle forbids
    pub fn determine_target_state(
        current: WorkflowStatus,
        event: &LifecycleEvent,
    ) -> StateMachineResult<WorkflowStatus> {
        let target = match (current, event) {
            (WorkflowStatus::Created, LifecycleEvent::Start) => WorkflowStatus::InProgress,
            (WorkflowStatus::InProgress, LifecycleEvent::Pause) => WorkflowStatus::Paused,
            (WorkflowStatus::Paused, LifecycleEvent::Resume) => WorkflowStatus::InProgress,
            (WorkflowStatus::InProgress, LifecycleEvent::Complete) => WorkflowStatus::Completed,
            (WorkflowStatus::InProgress, LifecycleEvent::Fail(_)) => WorkflowStatus::Failed,
            (from, LifecycleEvent::Cancel) if !from.is_terminal() => WorkflowStatus::Cancelled,
            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    action: event.event_type(),
                    status: from,
                })
            }
        };

        Ok(target)
    }

    /// Move to `target` through the matching lifecycle event
    pub fn transition_to(&mut self, target: WorkflowStatus) -> StateMachineResult<WorkflowStatus> {
        let event = match target {
            WorkflowStatus::InProgress if self.status.status == WorkflowStatus::Paused => {
                LifecycleEvent::Resume
            }
            WorkflowStatus::InProgress => LifecycleEvent::Start,
            WorkflowStatus::Paused => LifecycleEvent::Pause,
            WorkflowStatus::Completed => LifecycleEvent::Complete,
            WorkflowStatus::Failed => LifecycleEvent::fail_with_error(BATCH_FAILURE_MESSAGE),
            WorkflowStatus::Cancelled => LifecycleEvent::Cancel,
            WorkflowStatus::Created => {
                return Err(StateMachineError::UnreachableStatus { target });
            }
        };
        self.apply(event)
    }

    fn ensure_stage_operable(&self, action: &'static str, stage: &str) -> StateMachineResult<()> {
        if self.status.status != WorkflowStatus::InProgress {
            return Err(StateMachineError::WorkflowNotInProgress {
                action,
                stage: stage.to_string(),
                status: self.status.status,
            });
        }
        if !self.config.declares(stage) {
            return Err(StateMachineError::UnknownStage {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_stage_running(&self, stage: &str) -> StateMachineResult<()> {
        match self.status.stage_status(stage) {
            Some(StageStatus::Running) => Ok(()),
            other => Err(StateMachineError::StageNotRunning {
                stage: stage.to_string(),
                current: other.map_or_else(|| "absent".to_string(), |s| s.to_string()),
            }),
        }
    }

    fn ensure_stage_startable(&self, stage: &str) -> StateMachineResult<()> {
        match self.status.stage_status(stage) {
            Some(StageStatus::Running) => Err(StateMachineError::StageAlreadyRunning {
                stage: stage.to_string(),
            }),
            Some(status) if status.is_resolved() => Err(StateMachineError::StageAlreadyResolved {
                stage: stage.to_string(),
                status,
            }),
            _ => Ok(()),
        }
    }

    pub fn start_stage(&mut self, stage: &str) -> StateMachineResult<()> {
        self.ensure_stage_operable("start", stage)?;
        self.ensure_stage_startable(stage)?;

        let now = Utc::now();
        let entry = self
            .status
            .stage_results
            .entry(stage.to_string())
            .or_insert_with(|| StageResult::pending(stage));
        entry.status = StageStatus::Running;
        entry.started_at = Some(now);
        entry.ended_at = None;
        entry.error = None;
        entry.error_code = None;
        entry.attempts += 1;

        self.status.current_stage = Some(stage.to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn complete_stage(&mut self, stage: &str, result: Option<Value>) -> StateMachineResult<()> {
        self.ensure_stage_operable("complete", stage)?;
        self.ensure_stage_running(stage)?;

        let now = Utc::now();
        if let Some(entry) = self.status.stage_results.get_mut(stage) {
            entry.status = StageStatus::Completed;
            entry.ended_at = Some(now);
            entry.result = result;
        }
        if !self.status.completed_stages.iter().any(|s| s == stage) {
            self.status.completed_stages.push(stage.to_string());
        }
        self.updated_at = now;
        Ok(())
    }

    /// Mark a running stage failed; the overall status is left to the orchestrator
    pub fn fail_stage(
        &mut self,
        stage: &str,
        error: impl Into<String>,
        error_code: Option<String>,
    ) -> StateMachineResult<()> {
        self.ensure_stage_operable("fail", stage)?;
        self.ensure_stage_running(stage)?;

        let now = Utc::now();
        if let Some(entry) = self.status.stage_results.get_mut(stage) {
            entry.status = StageStatus::Failed;
            entry.ended_at = Some(now);
            entry.error = Some(error.into());
            entry.error_code = error_code;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn skip_stage(&mut self, stage: &str, reason: impl Into<String>) -> StateMachineResult<()> {
        self.ensure_stage_operable("skip", stage)?;
        self.ensure_stage_startable(stage)?;

        let now = Utc::now();
        let entry = self
            .status
            .stage_results
            .entry(stage.to_string())
            .or_insert_with(|| StageResult::pending(stage));
        entry.status = StageStatus::Skipped;
        entry.ended_at = Some(now);
        entry.result = Some(serde_json::json!({ "reason": reason.into() }));
        self.updated_at = now;
        Ok(())
    }

    /// First stage in configuration order that is neither completed nor skipped
    pub fn next_stage(&self) -> Option<String> {
        self.config
            .stages
            .iter()
            .find(|stage| {
                !self.status.completed_stages.contains(stage)
                    && self.status.stage_status(stage) != Some(StageStatus::Skipped)
            })
            .cloned()
    }

    /// Stages that still need an executor call
    pub fn unresolved_stages(&self) -> Vec<String> {
        self.config
            .stages
            .iter()
            .filter(|stage| {
                !self
                    .status
                    .stage_status(stage)
                    .is_some_and(|status| status.is_resolved())
            })
            .cloned()
            .collect()
    }

    pub fn is_stage_running(&self, stage: &str) -> bool {
        self.status.stage_status(stage) == Some(StageStatus::Running)
    }

    pub fn can_retry(&self) -> bool {
        match &self.config.retry_policy {
            Some(policy) => self.status.retry_count < policy.max_attempts,
            None => false,
        }
    }

    /// Count one retry of `stage`, refusing to exceed the policy bound
    pub fn record_retry(&mut self, stage: &str) -> StateMachineResult<u32> {
        let max_attempts = match &self.config.retry_policy {
            Some(policy) => policy.max_attempts,
            None => return Err(StateMachineError::NoRetryPolicy),
        };
        if self.status.retry_count >= max_attempts {
            return Err(StateMachineError::RetryLimitReached {
                retry_count: self.status.retry_count,
                max_attempts,
            });
        }

        self.status.retry_count += 1;
        if let Some(entry) = self.status.stage_results.get_mut(stage) {
            entry.attempts += 1;
        }
        self.updated_at = Utc::now();
        Ok(self.status.retry_count)
    }

    /// Outputs of completed stages, in completion order
    pub fn completed_outputs(&self) -> Vec<(String, Option<Value>)> {
        self.status
            .completed_stages
            .iter()
            .map(|stage| {
                let data = self
                    .status
                    .stage_results
                    .get(stage)
                    .and_then(|r| r.result.clone());
                (stage.clone(), data)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetryPolicy;

    fn execution(stages: &[&str]) -> WorkflowExecution {
        WorkflowExecution::new(
            Uuid::new_v4(),
            WorkflowConfig::new("test-workflow", stages.iter().copied()),
            ExecutionContext::new("ctx-1"),
        )
    }

    fn started(stages: &[&str]) -> WorkflowExecution {
        let mut exec = execution(stages);
        exec.start().unwrap();
        exec
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let mut exec = execution(&["a"]);
        assert_eq!(exec.current_status(), WorkflowStatus::Created);
        assert!(exec.duration().is_none());

        assert_eq!(exec.start().unwrap(), WorkflowStatus::InProgress);
        assert!(exec.status().started_at.is_some());
        assert_eq!(exec.pause().unwrap(), WorkflowStatus::Paused);
        assert_eq!(exec.resume().unwrap(), WorkflowStatus::InProgress);
        assert_eq!(exec.complete().unwrap(), WorkflowStatus::Completed);

        let status = exec.status();
        assert!(status.ended_at.is_some());
        assert!(status.duration_ms.is_some());
        assert!(exec.duration().is_some());
    }

    #[test]
    fn test_invalid_transitions_do_not_mutate() {
        let mut exec = execution(&["a"]);
        let before = exec.clone();

        let err = exec.pause().unwrap_err();
        assert_eq!(err.to_string(), "cannot pause in status created");
        assert!(exec.complete().is_err());
        assert!(exec.fail("boom").is_err());
        assert!(exec.resume().is_err());
        assert_eq!(exec, before);

        exec.start().unwrap();
        let err = exec.start().unwrap_err();
        assert_eq!(err.to_string(), "cannot start in status in_progress");

        exec.pause().unwrap();
        let err = exec.pause().unwrap_err();
        assert_eq!(err.to_string(), "cannot pause in status paused");
        assert!(exec.complete().is_err());
        assert_eq!(exec.current_status(), WorkflowStatus::Paused);
    }

    #[test]
    fn test_cancel_from_any_non_terminal_state() {
        let mut created = execution(&["a"]);
        assert_eq!(created.cancel().unwrap(), WorkflowStatus::Cancelled);
        assert!(created.status().duration_ms.is_some());

        let mut paused = started(&["a"]);
        paused.pause().unwrap();
        assert_eq!(paused.cancel().unwrap(), WorkflowStatus::Cancelled);

        let mut completed = started(&["a"]);
        completed.complete().unwrap();
        let err = completed.cancel().unwrap_err();
        assert_eq!(err.to_string(), "cannot cancel in status completed");
        assert_eq!(completed.current_status(), WorkflowStatus::Completed);
    }

    #[test]
    fn test_fail_records_error() {
        let mut exec = started(&["a"]);
        exec.fail("executor exploded").unwrap();
        assert_eq!(exec.current_status(), WorkflowStatus::Failed);
        assert_eq!(exec.status().error.as_deref(), Some("executor exploded"));
        assert!(exec.resume().is_err());
    }

    #[test]
    fn test_stage_operations_require_in_progress() {
        let mut exec = execution(&["a"]);
        let err = exec.start_stage("a").unwrap_err();
        assert!(matches!(
            err,
            StateMachineError::WorkflowNotInProgress {
                status: WorkflowStatus::Created,
                ..
            }
        ));

        exec.start().unwrap();
        exec.pause().unwrap();
        assert!(exec.start_stage("a").is_err());
        assert!(exec.skip_stage("a", "not needed").is_err());
    }

    #[test]
    fn test_stage_must_be_declared() {
        let mut exec = started(&["a"]);
        assert_eq!(
            exec.start_stage("zzz").unwrap_err(),
            StateMachineError::UnknownStage {
                stage: "zzz".to_string()
            }
        );
    }

    #[test]
    fn test_stage_lifecycle() {
        let mut exec = started(&["a", "b"]);
        assert_eq!(exec.next_stage().as_deref(), Some("a"));

        exec.start_stage("a").unwrap();
        assert_eq!(exec.status().current_stage.as_deref(), Some("a"));
        assert!(exec.is_stage_running("a"));
        assert_eq!(
            exec.start_stage("a").unwrap_err(),
            StateMachineError::StageAlreadyRunning {
                stage: "a".to_string()
            }
        );

        exec.complete_stage("a", Some(serde_json::json!({"ok": true})))
            .unwrap();
        assert_eq!(exec.status().completed_stages, vec!["a".to_string()]);
        assert_eq!(exec.next_stage().as_deref(), Some("b"));
        assert!(exec.start_stage("a").is_err());

        let result = exec.status().stage_result("a").unwrap();
        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
        assert!(result.duration_ms().is_some());
    }

    #[test]
    fn test_complete_and_fail_require_running_stage() {
        let mut exec = started(&["a"]);
        let err = exec.complete_stage("a", None).unwrap_err();
        assert_eq!(err.to_string(), "stage a is not running (current: absent)");
        assert!(exec.fail_stage("a", "nope", None).is_err());
        assert!(exec.status().completed_stages.is_empty());
    }

    #[test]
    fn test_fail_stage_keeps_workflow_in_progress() {
        let mut exec = started(&["a"]);
        exec.start_stage("a").unwrap();
        exec.fail_stage("a", "bad input", Some("STAGE_FAILED".to_string()))
            .unwrap();

        assert_eq!(exec.current_status(), WorkflowStatus::InProgress);
        let result = exec.status().stage_result("a").unwrap();
        assert!(result.is_failure());
        assert_eq!(result.error.as_deref(), Some("bad input"));
        assert_eq!(result.error_code.as_deref(), Some("STAGE_FAILED"));
        assert_eq!(exec.next_stage().as_deref(), Some("a"));
    }

    #[test]
    fn test_skip_stage_without_start() {
        let mut exec = started(&["a", "b"]);
        exec.skip_stage("a", "disabled for tenant").unwrap();

        let result = exec.status().stage_result("a").unwrap();
        assert_eq!(result.status, StageStatus::Skipped);
        assert_eq!(
            result.result,
            Some(serde_json::json!({"reason": "disabled for tenant"}))
        );
        assert!(exec.status().completed_stages.is_empty());
        assert_eq!(exec.next_stage().as_deref(), Some("b"));
        assert_eq!(exec.unresolved_stages(), vec!["b".to_string()]);
        assert!(exec.start_stage("a").is_err());
    }

    #[test]
    fn test_next_stage_none_when_all_complete() {
        let mut exec = started(&["a"]);
        exec.start_stage("a").unwrap();
        exec.complete_stage("a", None).unwrap();
        assert!(exec.next_stage().is_none());
        assert_eq!(exec.completed_outputs(), vec![("a".to_string(), None)]);
    }

    #[test]
    fn test_retry_bound() {
        let mut no_policy = started(&["a"]);
        assert!(!no_policy.can_retry());
        assert_eq!(
            no_policy.record_retry("a").unwrap_err(),
            StateMachineError::NoRetryPolicy
        );

        let mut exec = WorkflowExecution::new(
            Uuid::new_v4(),
            WorkflowConfig::new("W", ["a"])
                .with_retry_policy(RetryPolicy::new(2, Duration::ZERO)),
            ExecutionContext::new("ctx"),
        );
        exec.start().unwrap();
        exec.start_stage("a").unwrap();

        assert!(exec.can_retry());
        assert_eq!(exec.record_retry("a").unwrap(), 1);
        assert_eq!(exec.record_retry("a").unwrap(), 2);
        assert!(!exec.can_retry());
        assert!(matches!(
            exec.record_retry("a"),
            Err(StateMachineError::RetryLimitReached { .. })
        ));
        assert_eq!(exec.status().retry_count, 2);
        assert_eq!(exec.status().stage_result("a").unwrap().attempts, 3);
    }

    #[test]
    fn test_transition_to_maps_lifecycle_events() {
        let mut exec = execution(&["a"]);
        assert!(exec.transition_to(WorkflowStatus::Created).is_err());
        exec.transition_to(WorkflowStatus::InProgress).unwrap();
        exec.transition_to(WorkflowStatus::Paused).unwrap();
        exec.transition_to(WorkflowStatus::InProgress).unwrap();
        exec.transition_to(WorkflowStatus::Failed).unwrap();
        assert_eq!(
            exec.status().error.as_deref(),
            Some("status updated by batch operation")
        );
        assert!(exec.transition_to(WorkflowStatus::Cancelled).is_err());
    }

    #[test]
    fn test_serde_round_trip_preserves_status() {
        let mut exec = started(&["a"]);
        exec.start_stage("a").unwrap();
        let json = serde_json::to_value(&exec).unwrap();
        assert_eq!(json["status"]["status"], "in_progress");

        let parsed: WorkflowExecution = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, exec);
    }
}
