mod common;

use common::*;
use serde_json::json;
use stage_orchestrator::{
    EventType, OrchestratorError, StageStatus, WorkflowConfig, WorkflowStatus,
};
use std::sync::Arc;

#[tokio::test]
async fn test_sequential_workflow_completes_in_order() {
    let orchestrator = orchestrator();
    let a = RecordingExecutor::new("context");
    let b = RecordingExecutor::new("plan");
    let c = RecordingExecutor::new("confirm");
    orchestrator.register_adapter("context", a.clone());
    orchestrator.register_adapter("plan", b.clone());
    orchestrator.register_adapter("confirm", c.clone());

    let status = orchestrator
        .execute_workflow(
            context(),
            WorkflowConfig::new("onboarding", ["context", "plan", "confirm"]),
        )
        .await
        .expect("workflow should complete");

    assert_eq!(status.status, WorkflowStatus::Completed);
    assert_eq!(
        status.completed_stages,
        vec!["context".to_string(), "plan".to_string(), "confirm".to_string()]
    );
    assert_eq!(status.retry_count, 0);
    assert!(status.error.is_none());
    assert!(status.started_at.is_some());
    assert!(status.ended_at.is_some());
    assert!(status.duration_ms.is_some());

    // Each stage sees the outputs of every stage before it
    assert!(a.calls()[0].previous_results.is_empty());
    let plan_input = &b.calls()[0];
    assert_eq!(plan_input.previous_results.len(), 1);
    assert_eq!(
        plan_input.previous("context").and_then(|p| p.data.clone()),
        Some(json!({ "stage": "context", "attempt": 1 }))
    );
    let confirm_input = &c.calls()[0];
    let chained: Vec<&str> = confirm_input
        .previous_results
        .iter()
        .map(|p| p.stage.as_str())
        .collect();
    assert_eq!(chained, vec!["context", "plan"]);
    assert_eq!(confirm_input.context.context_id, "ctx-test");
    assert_eq!(confirm_input.workflow_id, status.workflow_id);

    // The run leaves the active set and the stored record matches
    assert!(orchestrator.get_active_executions().is_empty());
    let stored = orchestrator
        .get_execution_status(status.workflow_id)
        .await
        .unwrap();
    assert_eq!(stored, status);
}

#[tokio::test]
async fn test_missing_adapter_fails_after_completed_stages() {
    let orchestrator = orchestrator();
    orchestrator.register_adapter("A", RecordingExecutor::new("A"));

    let err = orchestrator
        .execute_workflow(context(), WorkflowConfig::new("W", ["A", "B"]))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "No adapter registered for stage: B");
    let workflow_id = err.workflow_id().expect("failure carries the workflow id");

    let stored = orchestrator.get_execution_status(workflow_id).await.unwrap();
    assert_eq!(stored.status, WorkflowStatus::Failed);
    assert_eq!(stored.completed_stages, vec!["A".to_string()]);
    assert_eq!(
        stored.error.as_deref(),
        Some("No adapter registered for stage: B")
    );
    assert!(orchestrator.get_active_executions().is_empty());
}

#[tokio::test]
async fn test_missing_adapter_reports_no_stage_failure() {
    let orchestrator = orchestrator();
    orchestrator.register_adapter("A", RecordingExecutor::new("A"));

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    orchestrator.add_global_event_listener(move |event| {
        sink.lock().push(event.event_type);
        Ok(())
    });

    let err = orchestrator
        .execute_workflow(context(), WorkflowConfig::new("W", ["A", "B"]))
        .await
        .unwrap_err();
    let workflow_id = err.workflow_id().unwrap();

    let events = seen.lock().clone();
    assert!(!events.contains(&EventType::StageFailed));
    assert_eq!(events.last(), Some(&EventType::WorkflowFailed));
    assert_eq!(orchestrator.metrics().stage_failures, 0);
    assert_eq!(orchestrator.metrics().workflows_failed, 1);

    let stored = orchestrator.get_execution_status(workflow_id).await.unwrap();
    assert!(stored.stage_result("B").is_none());
}

#[tokio::test]
async fn test_stage_failure_message_is_preserved() {
    let orchestrator = orchestrator();
    let first = RecordingExecutor::new("context");
    let third = RecordingExecutor::new("trace");
    orchestrator.register_adapter("context", first.clone());
    orchestrator.register_adapter("plan", FailingExecutor::new("plan", "planner rejected the goal"));
    orchestrator.register_adapter("trace", third.clone());

    let err = orchestrator
        .execute_workflow(context(), WorkflowConfig::new("W", ["context", "plan", "trace"]))
        .await
        .unwrap_err();

    match &err {
        OrchestratorError::WorkflowFailed { stage, message, .. } => {
            assert_eq!(stage.as_deref(), Some("plan"));
            assert_eq!(message, "planner rejected the goal");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Nothing after the failed stage runs
    assert_eq!(third.call_count(), 0);

    let execution = orchestrator
        .get_execution(err.workflow_id().unwrap())
        .await
        .unwrap();
    let status = execution.status();
    assert_eq!(status.status, WorkflowStatus::Failed);
    assert_eq!(status.stage_status("plan"), Some(StageStatus::Failed));
    let plan = status.stage_result("plan").unwrap();
    assert_eq!(plan.error.as_deref(), Some("planner rejected the goal"));
    assert_eq!(plan.error_code.as_deref(), Some("STAGE_FAILED"));
    assert!(status.stage_result("trace").is_none());
}

#[tokio::test]
async fn test_executor_error_and_panic_become_failures() {
    let orchestrator = orchestrator();
    orchestrator.register_adapter("erroring", ErroringExecutor::new("erroring", "upstream 503"));
    orchestrator.register_adapter("panicking", PanickingExecutor::new("panicking"));

    let err = orchestrator
        .execute_workflow(context(), WorkflowConfig::new("W", ["erroring"]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "upstream 503");

    let err = orchestrator
        .execute_workflow(context(), WorkflowConfig::new("W", ["panicking"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("executor exploded"));

    let stored = orchestrator
        .get_execution(err.workflow_id().unwrap())
        .await
        .unwrap();
    assert_eq!(
        stored.status().stage_result("panicking").unwrap().error_code.as_deref(),
        Some("STAGE_PANICKED")
    );

    // The orchestrator keeps working after a panicking executor
    orchestrator.register_adapter("ok", RecordingExecutor::new("ok"));
    let status = orchestrator
        .execute_workflow(context(), WorkflowConfig::new("W", ["ok"]))
        .await
        .unwrap();
    assert_eq!(status.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn test_skip_stages_are_not_invoked() {
    let orchestrator = orchestrator();
    let a = RecordingExecutor::new("a");
    let b = RecordingExecutor::new("b");
    orchestrator.register_adapter("a", a.clone());
    orchestrator.register_adapter("b", b.clone());

    let status = orchestrator
        .execute_workflow(
            context(),
            WorkflowConfig::new("W", ["a", "b"]).with_skip_stages(["b"]),
        )
        .await
        .unwrap();

    assert_eq!(status.status, WorkflowStatus::Completed);
    assert_eq!(status.completed_stages, vec!["a".to_string()]);
    assert_eq!(status.stage_status("b"), Some(StageStatus::Skipped));
    assert_eq!(b.call_count(), 0);
    assert_eq!(a.call_count(), 1);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected_without_persisting() {
    let store = FailingStore::new();
    let orchestrator = stage_orchestrator::Orchestrator::new(
        Default::default(),
        std::sync::Arc::new(store.clone()),
    )
    .unwrap();

    let err = orchestrator
        .execute_workflow(context(), WorkflowConfig::new("W", ["a", "a"]))
        .await
        .unwrap_err();

    assert!(err.is_rejection());
    assert!(err
        .to_string()
        .starts_with("Invalid workflow configuration: "));
    assert!(store.backing().is_empty().await);
    assert_eq!(orchestrator.metrics().workflows_rejected, 1);
}
