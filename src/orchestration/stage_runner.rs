//! # Stage Runner
//!
//! Invokes executors with panic isolation. Execution calls race a timeout;
//! status, health and describe calls never propagate a panic to the caller.

use crate::executor::{ExecutorDescriptor, SharedExecutor, StageError, StageInput};
use crate::state_machine::StageStatus;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Default)]
pub struct StageRunner;

impl StageRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run one executor call, folding every failure mode into [`StageError`]
    pub async fn invoke(
        &self,
        executor: &SharedExecutor,
        input: StageInput,
        call_timeout: Duration,
    ) -> Result<Option<Value>, StageError> {
        let stage = input.stage.clone();
        let workflow_id = input.workflow_id;
        let attempt = input.attempt;
        let start_time = Instant::now();

        let execution_result = timeout(
            call_timeout,
            AssertUnwindSafe(executor.execute(input)).catch_unwind(),
        )
        .await;

        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        match execution_result {
            Ok(Ok(Ok(output))) if output.success => {
                debug!(
                    workflow_id = %workflow_id,
                    stage = %stage,
                    attempt = attempt,
                    execution_time_ms = execution_time_ms,
                    "Stage executor completed"
                );
                Ok(output.data)
            }
            Ok(Ok(Ok(output))) => {
                let message = output
                    .error
                    .unwrap_or_else(|| format!("Stage {stage} reported failure"));
                warn!(
                    workflow_id = %workflow_id,
                    stage = %stage,
                    attempt = attempt,
                    error = %message,
                    "Stage executor reported failure"
                );
                Err(StageError::Execution(message))
            }
            Ok(Ok(Err(stage_error))) => {
                warn!(
                    workflow_id = %workflow_id,
                    stage = %stage,
                    attempt = attempt,
                    error = %stage_error,
                    "Stage executor returned error"
                );
                Err(stage_error)
            }
            Ok(Err(panic_error)) => {
                let panic_msg = panic_message(panic_error.as_ref());
                error!(
                    workflow_id = %workflow_id,
                    stage = %stage,
                    attempt = attempt,
                    panic_msg = %panic_msg,
                    "Stage executor panicked"
                );
                Err(StageError::Panicked(panic_msg))
            }
            Err(_elapsed) => {
                let timeout_ms = call_timeout.as_millis() as u64;
                warn!(
                    workflow_id = %workflow_id,
                    stage = %stage,
                    attempt = attempt,
                    timeout_ms = timeout_ms,
                    "Stage executor timed out"
                );
                Err(StageError::Timeout { stage, timeout_ms })
            }
        }
    }

    /// Liveness check; errors and panics read as `failed`
    pub async fn query_status(&self, stage: &str, executor: &SharedExecutor) -> StageStatus {
        match AssertUnwindSafe(executor.status()).catch_unwind().await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                warn!(stage = %stage, error = %err, "Stage status query failed");
                StageStatus::Failed
            }
            Err(panic_error) => {
                warn!(stage = %stage, panic_msg = %panic_message(panic_error.as_ref()), "Stage status query panicked");
                StageStatus::Failed
            }
        }
    }

    pub async fn check_health(&self, stage: &str, executor: &SharedExecutor) -> bool {
        match AssertUnwindSafe(executor.health_check()).catch_unwind().await {
            Ok(healthy) => healthy,
            Err(panic_error) => {
                warn!(stage = %stage, panic_msg = %panic_message(panic_error.as_ref()), "Stage health check panicked");
                false
            }
        }
    }

    pub fn describe(&self, stage: &str, executor: &SharedExecutor) -> Option<ExecutorDescriptor> {
        match catch_unwind(AssertUnwindSafe(|| executor.describe())) {
            Ok(descriptor) => Some(descriptor),
            Err(panic_error) => {
                warn!(stage = %stage, panic_msg = %panic_message(panic_error.as_ref()), "Stage describe panicked");
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
