//! # Lifecycle Hooks
//!
//! Optional callbacks invoked around a workflow run and each of its stages.
//! Hooks observe; they never change a run's outcome. An error or panic raised by a
//! hook is logged and the run carries on.

use crate::models::{ExecutionContext, StageResult};
use crate::state_machine::ExecutionStatus;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::warn;
use uuid::Uuid;

pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Callbacks around the workflow and stage lifecycle. Every method defaults to a no-op.
#[async_trait::async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// After the workflow has started, before any stage runs
    async fn before_workflow(
        &self,
        workflow_id: Uuid,
        context: &ExecutionContext,
    ) -> Result<(), HookError> {
        let _ = (workflow_id, context);
        Ok(())
    }

    /// After a workflow completes successfully
    async fn after_workflow(&self, status: &ExecutionStatus) -> Result<(), HookError> {
        let _ = status;
        Ok(())
    }

    /// When a stage has been marked running, before its executor is called
    async fn before_stage(
        &self,
        workflow_id: Uuid,
        stage: &str,
        context: &ExecutionContext,
    ) -> Result<(), HookError> {
        let _ = (workflow_id, stage, context);
        Ok(())
    }

    /// After a stage's result has been recorded
    async fn after_stage(
        &self,
        workflow_id: Uuid,
        stage: &str,
        result: &StageResult,
        context: &ExecutionContext,
    ) -> Result<(), HookError> {
        let _ = (workflow_id, stage, result, context);
        Ok(())
    }

    /// When a workflow fails. `stage` names the failing stage, if any.
    async fn on_error(
        &self,
        workflow_id: Uuid,
        stage: Option<&str>,
        error: &str,
        context: &ExecutionContext,
    ) -> Result<(), HookError> {
        let _ = (workflow_id, stage, error, context);
        Ok(())
    }
}

/// Await one hook call, logging instead of propagating its error or panic
pub(crate) async fn run_hook<F>(hook: &'static str, workflow_id: Uuid, fut: F)
where
    F: Future<Output = Result<(), HookError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            hook,
            workflow_id = %workflow_id,
            error = %e,
            "Lifecycle hook returned an error"
        ),
        Err(_) => warn!(hook, workflow_id = %workflow_id, "Lifecycle hook panicked"),
    }
}
