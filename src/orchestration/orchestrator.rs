//! # Orchestrator Service
//!
//! Drives workflow executions through their stages.
//!
//! ## Architecture
//!
//! Each admitted workflow gets a handle in the active set. Every state
//! change goes through `commit`: under the handle's turn lock the change is applied
//! to a copy, the copy is written to the [`ExecutionStore`], and only then does it
//! replace the live execution. Control operations (pause, resume, cancel) use the same
//! path, so a transition and its persisted record never diverge.
//!
//! Pause and cancel are cooperative. A paused run starts nothing new and holds any
//! finished stage outcome until it is resumed; a cancelled run discards late results.
//! In-flight executor calls are never interrupted.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stage_orchestrator::{ExecutionContext, Orchestrator, OrchestratorConfig, WorkflowConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::with_in_memory_store(OrchestratorConfig::default())?;
//! // orchestrator.register_adapter("context", executor);
//! let status = orchestrator
//!     .execute_workflow(
//!         ExecutionContext::new("ctx-1"),
//!         WorkflowConfig::new("onboarding", ["context", "plan"]),
//!     )
//!     .await?;
//! println!("completed stages: {:?}", status.completed_stages);
//! # Ok(())
//! # }
//! ```

use super::admission::{AdmissionController, AdmissionPermit};
use super::hooks::{run_hook, LifecycleHooks};
use super::health::{HealthReport, HealthStatus, ModuleHealth, RegistrationReport};
use super::metrics::{MetricsSnapshot, OrchestratorMetrics};
use super::stage_runner::StageRunner;
use crate::config::OrchestratorConfig;
use crate::constants::{error_codes, CONFIGURED_SKIP_REASON};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::events::{EventBus, EventType, ListenerError, ListenerId, OrchestratorEvent};
use crate::executor::{AdapterRegistry, PriorStageOutput, SharedExecutor, StageError, StageInput};
use crate::logging::{log_error, log_stage_operation, log_workflow_operation};
use crate::models::{ExecutionContext, ExecutionMode, WorkflowConfig};
use crate::state_machine::{
    ExecutionStatus, StageStatus, StateMachineError, StateMachineResult, WorkflowExecution,
    WorkflowStatus,
};
use crate::store::{ExecutionStore, InMemoryExecutionStore, StoreError};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Error code recorded on stages still running when a parallel workflow fails
const ABANDONED_STAGE_CODE: &str = "STAGE_ABANDONED";

/// Live state of one admitted workflow
struct WorkflowHandle {
    workflow_id: Uuid,
    execution: parking_lot::Mutex<WorkflowExecution>,
    /// Wakes a paused run on resume or cancel
    control: Notify,
    /// Serializes commit-and-persist
    turn: tokio::sync::Mutex<()>,
    permit: parking_lot::Mutex<Option<AdmissionPermit>>,
}

impl WorkflowHandle {
    fn new(execution: WorkflowExecution, permit: AdmissionPermit) -> Self {
        Self {
            workflow_id: execution.workflow_id(),
            execution: parking_lot::Mutex::new(execution),
            control: Notify::new(),
            turn: tokio::sync::Mutex::new(()),
            permit: parking_lot::Mutex::new(Some(permit)),
        }
    }

    fn snapshot(&self) -> WorkflowExecution {
        self.execution.lock().clone()
    }

    fn status(&self) -> WorkflowStatus {
        self.execution.lock().current_status()
    }

    fn execution_status(&self) -> ExecutionStatus {
        self.execution.lock().status().clone()
    }

    fn context(&self) -> ExecutionContext {
        self.execution.lock().context().clone()
    }

    fn stage_input(&self, stage: &str, attempt: u32, chain: bool) -> StageInput {
        let execution = self.execution.lock();
        let previous_results = if chain {
            execution
                .completed_outputs()
                .into_iter()
                .map(|(stage, data)| PriorStageOutput { stage, data })
                .collect()
        } else {
            Vec::new()
        };

        StageInput {
            workflow_id: self.workflow_id,
            stage: stage.to_string(),
            attempt,
            context: execution.context().clone(),
            previous_results,
        }
    }
}

/// Why a commit did not take effect
enum CommitError {
    Rejected {
        status: WorkflowStatus,
        err: StateMachineError,
    },
    Persistence(StoreError),
}

/// Why the run loop stopped before completing
enum RunError {
    Paused,
    Halted(WorkflowStatus),
    Persistence(StoreError),
    StageFailed {
        stage: Option<String>,
        message: String,
        code: Option<String>,
    },
    Defect(String),
}

impl From<CommitError> for RunError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::Rejected {
                status: WorkflowStatus::Paused,
                ..
            } => Self::Paused,
            CommitError::Rejected { status, .. } if status.is_terminal() => Self::Halted(status),
            CommitError::Rejected { err, .. } => Self::Defect(err.to_string()),
            CommitError::Persistence(err) => Self::Persistence(err),
        }
    }
}

impl From<CommitError> for OrchestratorError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::Rejected { err, .. } => Self::StateMachine(err),
            CommitError::Persistence(err) => Self::Store(err),
        }
    }
}

impl RunError {
    fn stage_failed(stage: &str, err: &StageError) -> Self {
        Self::StageFailed {
            stage: Some(stage.to_string()),
            message: err.to_string(),
            code: Some(err.error_code().to_string()),
        }
    }

    fn missing_adapter(stage: String) -> Self {
        Self::StageFailed {
            message: format!("No adapter registered for stage: {stage}"),
            stage: Some(stage),
            code: Some(error_codes::ADAPTER_MISSING.to_string()),
        }
    }
}

/// Overall run budget
#[derive(Debug, Clone, Copy)]
struct WorkflowDeadline {
    at: Instant,
    budget_ms: u64,
}

/// Retires a workflow when the run ends, including when its future is dropped
struct Retirement<'a> {
    orchestrator: &'a Orchestrator,
    workflow_id: Uuid,
}

impl Drop for Retirement<'_> {
    fn drop(&mut self) {
        self.orchestrator.retire(self.workflow_id);
    }
}

struct OrchestratorInner {
    orchestrator_id: Uuid,
    config: OrchestratorConfig,
    adapters: AdapterRegistry,
    active: parking_lot::Mutex<HashMap<Uuid, Arc<WorkflowHandle>>>,
    admission: AdmissionController,
    store: Arc<dyn ExecutionStore>,
    events: EventBus,
    metrics: OrchestratorMetrics,
    runner: StageRunner,
    hooks: parking_lot::RwLock<Option<Arc<dyn LifecycleHooks>>>,
    started_at: std::time::Instant,
}

/// Multi-stage workflow orchestrator; cheap to clone, clones share all state
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("orchestrator_id", &self.inner.orchestrator_id)
            .field("config", &self.inner.config)
            .field("adapters", &self.inner.adapters)
            .field("active_executions", &self.inner.active.lock().len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, store: Arc<dyn ExecutionStore>) -> OrchestratorResult<Self> {
        config.validate()?;

        let orchestrator_id = Uuid::new_v4();
        info!(
            orchestrator_id = %orchestrator_id,
            module_timeout_ms = config.module_timeout_ms,
            max_concurrent_executions = config.max_concurrent_executions,
            enable_events = config.enable_events,
            enable_metrics = config.enable_metrics,
            "Orchestrator initialized"
        );

        Ok(Self {
            inner: Arc::new(OrchestratorInner {
                orchestrator_id,
                adapters: AdapterRegistry::new(),
                active: parking_lot::Mutex::new(HashMap::new()),
                admission: AdmissionController::new(config.max_concurrent_executions),
                store,
                events: EventBus::new(config.event_channel_capacity, config.enable_events),
                metrics: OrchestratorMetrics::new(config.enable_metrics),
                runner: StageRunner::new(),
                hooks: parking_lot::RwLock::new(None),
                started_at: std::time::Instant::now(),
                config,
            }),
        })
    }

    pub fn with_in_memory_store(config: OrchestratorConfig) -> OrchestratorResult<Self> {
        Self::new(config, Arc::new(InMemoryExecutionStore::new()))
    }

    pub fn orchestrator_id(&self) -> Uuid {
        self.inner.orchestrator_id
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> Arc<dyn ExecutionStore> {
        Arc::clone(&self.inner.store)
    }

    /// Install lifecycle hooks, replacing any previous set
    pub fn set_lifecycle_hooks(&self, hooks: Arc<dyn LifecycleHooks>) {
        *self.inner.hooks.write() = Some(hooks);
    }

    pub fn clear_lifecycle_hooks(&self) {
        self.inner.hooks.write().take();
    }

    fn hooks(&self) -> Option<Arc<dyn LifecycleHooks>> {
        self.inner.hooks.read().clone()
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Register the executor for a stage, replacing any previous one
    pub fn register_adapter(&self, stage: impl Into<String>, executor: SharedExecutor) {
        let stage = stage.into();
        let replaced = self.inner.adapters.register(stage.clone(), executor).is_some();
        info!(stage = %stage, replaced = replaced, "Stage adapter registered");
    }

    /// Register executors under the stage each one describes
    pub fn register_adapters<I>(&self, executors: I) -> Vec<String>
    where
        I: IntoIterator<Item = SharedExecutor>,
    {
        executors
            .into_iter()
            .filter_map(|executor| {
                let stage = match self.inner.runner.describe("<unregistered>", &executor) {
                    Some(descriptor) => descriptor.stage,
                    None => {
                        warn!("Skipping adapter whose describe() panicked");
                        return None;
                    }
                };
                self.register_adapter(stage.clone(), executor);
                Some(stage)
            })
            .collect()
    }

    pub fn unregister_adapter(&self, stage: &str) -> bool {
        self.inner.adapters.unregister(stage).is_some()
    }

    pub fn registered_stages(&self) -> Vec<String> {
        self.inner.adapters.stages()
    }

    /// Report which of `required` have no executor
    pub fn validate_registration(&self, required: &[String]) -> RegistrationReport {
        let missing_stages = self.inner.adapters.missing(required);
        RegistrationReport {
            is_complete: missing_stages.is_empty(),
            missing_stages,
            registered_stages: self.inner.adapters.stages(),
        }
    }

    /// Query every registered executor; failing queries report `failed`
    pub async fn get_module_statuses(&self) -> HashMap<String, StageStatus> {
        let mut statuses = HashMap::new();
        for (stage, executor) in self.inner.adapters.snapshot() {
            let status = self.inner.runner.query_status(&stage, &executor).await;
            statuses.insert(stage, status);
        }
        statuses
    }

    pub async fn health_report(&self) -> HealthReport {
        let mut modules = Vec::new();
        for (stage, executor) in self.inner.adapters.snapshot() {
            let healthy = self.inner.runner.check_health(&stage, &executor).await;
            let status = self.inner.runner.query_status(&stage, &executor).await;
            let descriptor = self.inner.runner.describe(&stage, &executor);
            modules.push(ModuleHealth {
                stage,
                healthy,
                status,
                descriptor,
            });
        }

        HealthReport {
            orchestrator_id: self.inner.orchestrator_id,
            status: HealthStatus::from_modules(&modules),
            modules,
            active_executions: self.inner.active.lock().len(),
            uptime_seconds: self.inner.started_at.elapsed().as_secs(),
            checked_at: Utc::now(),
        }
    }

    // ---------------------------------------------------------------------
    // Events and metrics
    // ---------------------------------------------------------------------

    pub fn add_event_listener<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(&OrchestratorEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.inner.events.add_listener(event_type, listener)
    }

    /// Listen to every event type
    pub fn add_global_event_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&OrchestratorEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.inner.events.add_global_listener(listener)
    }

    /// Listen to every event emitted for one stage
    pub fn add_stage_event_listener<F>(&self, stage: &str, listener: F) -> ListenerId
    where
        F: Fn(&OrchestratorEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.inner.events.add_stage_listener(stage, listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove_listener(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    fn emit_workflow(&self, event_type: EventType, workflow_id: Uuid, data: Value) {
        self.inner
            .events
            .emit(OrchestratorEvent::workflow(event_type, workflow_id, data));
    }

    fn emit_stage(&self, event_type: EventType, workflow_id: Uuid, stage: &str, data: Value) {
        self.inner
            .events
            .emit(OrchestratorEvent::stage(event_type, workflow_id, stage, data));
    }

    // ---------------------------------------------------------------------
    // Execution
    // ---------------------------------------------------------------------

    /// Validate, admit and run a workflow to completion
    ///
    /// Returns the final [`ExecutionStatus`] on success. A failed run returns
    /// [`OrchestratorError::WorkflowFailed`] whose message is the underlying error text.
    #[instrument(skip(self, context, config), fields(workflow_name = %config.name))]
    pub async fn execute_workflow(
        &self,
        context: ExecutionContext,
        config: WorkflowConfig,
    ) -> OrchestratorResult<ExecutionStatus> {
        if let Err(err) = config.validate() {
            self.inner.metrics.workflow_rejected();
            warn!(workflow_name = %config.name, error = %err, "Rejected invalid workflow configuration");
            return Err(OrchestratorError::InvalidConfiguration {
                reason: err.to_string(),
            });
        }

        let Some(permit) = self.inner.admission.try_admit() else {
            self.inner.metrics.workflow_rejected();
            let limit = self.inner.admission.limit();
            warn!(workflow_name = %config.name, limit = limit, "Admission rejected: capacity reached");
            return Err(OrchestratorError::CapacityExceeded { limit });
        };
        self.inner.metrics.workflow_submitted();

        let execution = WorkflowExecution::new(self.inner.orchestrator_id, config, context);
        let workflow_id = execution.workflow_id();
        let workflow_name = execution.config().name.clone();

        if let Err(err) = self.inner.store.save(&execution).await {
            self.inner.metrics.workflow_failed();
            log_error("orchestrator", "save_execution", &err.to_string(), Some(&workflow_name));
            return Err(OrchestratorError::workflow_failed(
                Some(workflow_id),
                None,
                err.to_string(),
            ));
        }

        let handle = Arc::new(WorkflowHandle::new(execution, permit));
        self.inner
            .active
            .lock()
            .insert(workflow_id, Arc::clone(&handle));
        let _retirement = Retirement {
            orchestrator: self,
            workflow_id,
        };

        log_workflow_operation("submit", Some(workflow_id), Some(&workflow_name), "admitted", None);

        let result = match self.run(&handle).await {
            Ok(()) => self.finish_success(&handle).await,
            Err(err) => self.finish_with(&handle, err).await,
        };

        let outcome = if result.is_ok() { "completed" } else { "ended" };
        log_workflow_operation("execute", Some(workflow_id), Some(&workflow_name), outcome, None);
        result
    }

    async fn run(&self, handle: &WorkflowHandle) -> Result<(), RunError> {
        let config = handle.snapshot().config().clone();
        let deadline = config.timeout().map(|budget| WorkflowDeadline {
            at: Instant::now() + budget,
            budget_ms: budget.as_millis() as u64,
        });

        self.commit(handle, |execution| execution.start()).await?;
        self.emit_workflow(
            EventType::WorkflowStarted,
            handle.workflow_id,
            json!({
                "name": config.name,
                "execution_mode": config.execution_mode,
                "stages": config.stages,
            }),
        );
        if let Some(hooks) = self.hooks() {
            let context = handle.context();
            run_hook(
                "before_workflow",
                handle.workflow_id,
                hooks.before_workflow(handle.workflow_id, &context),
            )
            .await;
        }

        for stage in &config.skip_stages {
            self.commit_when_runnable(handle, |execution| {
                execution.skip_stage(stage, CONFIGURED_SKIP_REASON)
            })
            .await?;
            debug!(workflow_id = %handle.workflow_id, stage = %stage, "Stage skipped by configuration");
            self.emit_stage(
                EventType::StageSkipped,
                handle.workflow_id,
                stage,
                json!({ "reason": CONFIGURED_SKIP_REASON }),
            );
        }

        match config.execution_mode {
            ExecutionMode::Sequential => self.run_sequential(handle, deadline).await,
            ExecutionMode::Parallel => self.run_parallel(handle, deadline).await,
        }
    }

    async fn run_sequential(
        &self,
        handle: &WorkflowHandle,
        deadline: Option<WorkflowDeadline>,
    ) -> Result<(), RunError> {
        loop {
            self.wait_until_runnable(handle).await?;
            let Some(stage) = handle.execution.lock().next_stage() else {
                return Ok(());
            };
            let executor = self
                .inner
                .adapters
                .get(&stage)
                .ok_or_else(|| RunError::missing_adapter(stage.clone()))?;

            self.start_stage(handle, &stage).await?;
            self.settle_stage(handle, &stage, executor, true, deadline)
                .await?;
        }
    }

    async fn run_parallel(
        &self,
        handle: &WorkflowHandle,
        deadline: Option<WorkflowDeadline>,
    ) -> Result<(), RunError> {
        let pending = handle.execution.lock().unresolved_stages();

        let mut executors = Vec::with_capacity(pending.len());
        for stage in pending {
            match self.inner.adapters.get(&stage) {
                Some(executor) => executors.push((stage, executor)),
                None => return Err(RunError::missing_adapter(stage)),
            }
        }

        for (stage, _) in &executors {
            self.start_stage(handle, stage).await?;
        }

        let mut in_flight: FuturesUnordered<_> = executors
            .iter()
            .map(|(stage, executor)| {
                self.settle_stage(handle, stage, Arc::clone(executor), false, deadline)
            })
            .collect();

        // First failure wins; dropping the set abandons the remaining calls.
        while let Some(result) = in_flight.next().await {
            result?;
        }
        Ok(())
    }

    async fn start_stage(&self, handle: &WorkflowHandle, stage: &str) -> Result<(), RunError> {
        self.commit_when_runnable(handle, |execution| execution.start_stage(stage))
            .await?;
        log_stage_operation("start", handle.workflow_id, stage, Some(1), "running", None);
        if let Some(hooks) = self.hooks() {
            let context = handle.context();
            run_hook(
                "before_stage",
                handle.workflow_id,
                hooks.before_stage(handle.workflow_id, stage, &context),
            )
            .await;
        }
        self.emit_stage(EventType::StageStarted, handle.workflow_id, stage, json!({}));
        Ok(())
    }

    /// Invoke a running stage until it succeeds or exhausts its retries, then record the outcome
    async fn settle_stage(
        &self,
        handle: &WorkflowHandle,
        stage: &str,
        executor: SharedExecutor,
        chain: bool,
        deadline: Option<WorkflowDeadline>,
    ) -> Result<(), RunError> {
        let data = match self
            .invoke_with_retry(handle, stage, &executor, chain, deadline)
            .await?
        {
            Ok(data) => data,
            Err(err) => return Err(RunError::stage_failed(stage, &err)),
        };

        let stored = data.clone();
        self.commit_when_runnable(handle, |execution| {
            execution.complete_stage(stage, stored.clone())
        })
        .await?;

        log_stage_operation("complete", handle.workflow_id, stage, None, "completed", None);
        if let Some(hooks) = self.hooks() {
            let (result, context) = {
                let execution = handle.execution.lock();
                (
                    execution.status().stage_result(stage).cloned(),
                    execution.context().clone(),
                )
            };
            if let Some(result) = result {
                run_hook(
                    "after_stage",
                    handle.workflow_id,
                    hooks.after_stage(handle.workflow_id, stage, &result, &context),
                )
                .await;
            }
        }
        self.emit_stage(
            EventType::StageCompleted,
            handle.workflow_id,
            stage,
            json!({ "result": data }),
        );
        Ok(())
    }

    /// Outer `Err` stops the run; inner `Err` is the stage's final failure
    async fn invoke_with_retry(
        &self,
        handle: &WorkflowHandle,
        stage: &str,
        executor: &SharedExecutor,
        chain: bool,
        deadline: Option<WorkflowDeadline>,
    ) -> Result<Result<Option<Value>, StageError>, RunError> {
        let retry_delay = handle
            .execution
            .lock()
            .config()
            .retry_policy
            .as_ref()
            .map_or(Duration::ZERO, |policy| policy.delay());
        let mut attempt = 1;

        loop {
            self.wait_until_runnable(handle).await?;

            let err = match self.call_timeout(deadline) {
                Err(err) => err,
                Ok((call_timeout, truncated)) => {
                    self.inner.metrics.stage_attempted();
                    let input = handle.stage_input(stage, attempt, chain);
                    match self
                        .inner
                        .runner
                        .invoke(executor, input, call_timeout)
                        .await
                    {
                        Ok(data) => return Ok(Ok(data)),
                        Err(StageError::Timeout { .. }) if truncated => {
                            StageError::WorkflowTimeout {
                                timeout_ms: deadline.map_or(0, |d| d.budget_ms),
                            }
                        }
                        Err(err) => err,
                    }
                }
            };

            if err.is_timeout() {
                self.inner.metrics.stage_timed_out();
            }
            if !err.is_retryable() {
                return Ok(Err(err));
            }

            let retried = self
                .commit_when_runnable(handle, |execution| {
                    if execution.can_retry() {
                        execution.record_retry(stage).map(Some)
                    } else {
                        Ok(None)
                    }
                })
                .await?;

            let Some(retry_count) = retried else {
                return Ok(Err(err));
            };

            self.inner.metrics.stage_retried();
            log_stage_operation(
                "retry",
                handle.workflow_id,
                stage,
                Some(attempt + 1),
                "retrying",
                Some(&err.to_string()),
            );
            self.emit_stage(
                EventType::StageRetrying,
                handle.workflow_id,
                stage,
                json!({
                    "attempt": attempt + 1,
                    "retry_count": retry_count,
                    "error": err.to_string(),
                }),
            );

            if !retry_delay.is_zero() {
                tokio::time::sleep(retry_delay).await;
            }
            attempt += 1;
        }
    }

    /// Per-call timeout, clipped to what is left of the workflow budget
    ///
    /// The flag is set when the budget, not the module timeout, bounds the call.
    fn call_timeout(&self, deadline: Option<WorkflowDeadline>) -> Result<(Duration, bool), StageError> {
        let module_timeout = self.inner.config.module_timeout();
        let Some(deadline) = deadline else {
            return Ok((module_timeout, false));
        };

        let remaining = deadline.at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            Err(StageError::WorkflowTimeout {
                timeout_ms: deadline.budget_ms,
            })
        } else if remaining < module_timeout {
            Ok((remaining, true))
        } else {
            Ok((module_timeout, false))
        }
    }

    async fn finish_success(&self, handle: &WorkflowHandle) -> OrchestratorResult<ExecutionStatus> {
        if let Err(err) = self
            .commit_when_runnable(handle, |execution| execution.complete())
            .await
        {
            return self.finish_with(handle, err).await;
        }

        let status = handle.execution_status();
        self.inner.metrics.workflow_completed();
        info!(
            workflow_id = %handle.workflow_id,
            duration_ms = status.duration_ms,
            completed_stages = status.completed_stages.len(),
            "Workflow completed"
        );
        if let Some(hooks) = self.hooks() {
            run_hook("after_workflow", handle.workflow_id, hooks.after_workflow(&status)).await;
        }
        self.emit_workflow(
            EventType::WorkflowCompleted,
            handle.workflow_id,
            json!({
                "completed_stages": status.completed_stages,
                "duration_ms": status.duration_ms,
            }),
        );
        Ok(status)
    }

    async fn finish_with(
        &self,
        handle: &WorkflowHandle,
        err: RunError,
    ) -> OrchestratorResult<ExecutionStatus> {
        let workflow_id = handle.workflow_id;
        match err {
            RunError::Halted(WorkflowStatus::Cancelled) => {
                info!(workflow_id = %workflow_id, "Workflow run stopped after cancellation");
                Err(OrchestratorError::WorkflowCancelled { workflow_id })
            }
            RunError::StageFailed {
                stage,
                message,
                code,
            } => self.finish_failure(handle, stage, message, code).await,
            RunError::Persistence(err) => {
                self.finish_failure(
                    handle,
                    None,
                    err.to_string(),
                    Some(error_codes::PERSISTENCE_FAILED.to_string()),
                )
                .await
            }
            RunError::Halted(status) => {
                let message = format!("workflow {workflow_id} halted in unexpected status {status}");
                log_error("orchestrator", "run", &message, None);
                Err(OrchestratorError::Internal(message))
            }
            RunError::Paused => {
                let message = format!("workflow {workflow_id} left the run loop while paused");
                log_error("orchestrator", "run", &message, None);
                Err(OrchestratorError::Internal(message))
            }
            RunError::Defect(message) => {
                log_error("orchestrator", "run", &message, Some(&workflow_id.to_string()));
                match self.finish_failure(handle, None, message.clone(), None).await {
                    Err(OrchestratorError::WorkflowFailed { .. }) => {}
                    other => warn!(
                        workflow_id = %workflow_id,
                        outcome = ?other.map(|status| status.status),
                        "Workflow failure was not recorded after an internal error"
                    ),
                }
                Err(OrchestratorError::Internal(message))
            }
        }
    }

    /// Record the failure on the stage and the workflow, persist it, and report it
    async fn finish_failure(
        &self,
        handle: &WorkflowHandle,
        stage: Option<String>,
        message: String,
        code: Option<String>,
    ) -> OrchestratorResult<ExecutionStatus> {
        let workflow_id = handle.workflow_id;
        let fail = |execution: &mut WorkflowExecution| -> StateMachineResult<()> {
            if execution.current_status() == WorkflowStatus::Created {
                execution.start()?;
            }
            if let Some(stage) = &stage {
                if execution.is_stage_running(stage) {
                    execution.fail_stage(stage, message.clone(), code.clone())?;
                }
            }
            let abandoned: Vec<String> = execution
                .config()
                .stages
                .iter()
                .filter(|s| execution.is_stage_running(s))
                .cloned()
                .collect();
            for other in abandoned {
                execution.fail_stage(
                    &other,
                    "Abandoned after workflow failure",
                    Some(ABANDONED_STAGE_CODE.to_string()),
                )?;
            }
            execution.fail(message.clone())?;
            Ok(())
        };

        let reported = match self.commit_when_runnable(handle, &fail).await {
            Ok(()) => message.clone(),
            Err(RunError::Halted(WorkflowStatus::Cancelled)) => {
                return Err(OrchestratorError::WorkflowCancelled { workflow_id });
            }
            Err(RunError::Persistence(store_err)) => {
                // Keep the in-memory record truthful even though the store refused it.
                let mut execution = handle.execution.lock();
                if let Err(err) = fail(&mut *execution) {
                    warn!(workflow_id = %workflow_id, error = %err, "Could not record failure in memory");
                }
                format!("{message} (failed to persist failure: {store_err})")
            }
            Err(_) => {
                warn!(workflow_id = %workflow_id, "Workflow failure could not be recorded");
                message.clone()
            }
        };

        // A stage that never started (e.g. no adapter) has no failure to report.
        let failed_stage = stage.as_deref().filter(|stage| {
            handle.execution.lock().status().stage_status(stage) == Some(StageStatus::Failed)
        });

        if let Some(hooks) = self.hooks() {
            let context = handle.context();
            run_hook(
                "on_error",
                workflow_id,
                hooks.on_error(workflow_id, stage.as_deref(), &message, &context),
            )
            .await;
        }

        self.inner.metrics.workflow_failed();
        if let Some(stage) = failed_stage {
            self.inner.metrics.stage_failed();
            log_stage_operation("fail", workflow_id, stage, None, "failed", Some(&message));
            self.emit_stage(
                EventType::StageFailed,
                workflow_id,
                stage,
                json!({ "error": message, "error_code": code }),
            );
        }
        log_error("orchestrator", "execute_workflow", &reported, Some(&workflow_id.to_string()));
        self.emit_workflow(
            EventType::WorkflowFailed,
            workflow_id,
            json!({ "error": reported, "stage": stage }),
        );

        Err(OrchestratorError::WorkflowFailed {
            workflow_id: Some(workflow_id),
            stage,
            message: reported,
        })
    }

    // ---------------------------------------------------------------------
    // Commit protocol
    // ---------------------------------------------------------------------

    /// Apply a change to a copy, persist it, then publish it to the live execution
    async fn commit<T, F>(&self, handle: &WorkflowHandle, apply: F) -> Result<T, CommitError>
    where
        F: FnOnce(&mut WorkflowExecution) -> StateMachineResult<T> + Send,
    {
        let _turn = handle.turn.lock().await;

        let mut next = handle.snapshot();
        let status = next.current_status();
        let value = apply(&mut next).map_err(|err| CommitError::Rejected { status, err })?;

        self.inner
            .store
            .update(&next)
            .await
            .map_err(CommitError::Persistence)?;

        *handle.execution.lock() = next;
        Ok(value)
    }

    /// Commit once the workflow is not paused, retrying if a pause lands first
    async fn commit_when_runnable<T, F>(&self, handle: &WorkflowHandle, apply: F) -> Result<T, RunError>
    where
        F: Fn(&mut WorkflowExecution) -> StateMachineResult<T> + Send + Sync,
    {
        loop {
            self.wait_until_runnable(handle).await?;
            match self.commit(handle, &apply).await {
                Ok(value) => return Ok(value),
                Err(err) => match RunError::from(err) {
                    RunError::Paused => continue,
                    other => return Err(other),
                },
            }
        }
    }

    async fn wait_until_runnable(&self, handle: &WorkflowHandle) -> Result<(), RunError> {
        loop {
            let notified = handle.control.notified();
            tokio::pin!(notified);
            // Register before reading the status so a resume in between is not lost.
            notified.as_mut().enable();

            match handle.status() {
                WorkflowStatus::Paused => {
                    debug!(workflow_id = %handle.workflow_id, "Run waiting for resume");
                    notified.await;
                }
                status if status.is_terminal() => return Err(RunError::Halted(status)),
                _ => return Ok(()),
            }
        }
    }

    fn retire(&self, workflow_id: Uuid) {
        let handle = self.inner.active.lock().remove(&workflow_id);
        if let Some(handle) = handle {
            handle.permit.lock().take();
            debug!(workflow_id = %workflow_id, "Workflow retired from active set");
        }
    }

    fn active_handle(&self, workflow_id: Uuid) -> OrchestratorResult<Arc<WorkflowHandle>> {
        self.inner
            .active
            .lock()
            .get(&workflow_id)
            .cloned()
            .ok_or(OrchestratorError::NotActive { workflow_id })
    }

    // ---------------------------------------------------------------------
    // Control operations
    // ---------------------------------------------------------------------

    /// Pause an active workflow; no new stage starts until it is resumed
    #[instrument(skip(self))]
    pub async fn pause_workflow(&self, workflow_id: Uuid) -> OrchestratorResult<()> {
        let handle = self.active_handle(workflow_id)?;
        self.commit(&handle, |execution| execution.pause()).await?;

        log_workflow_operation("pause", Some(workflow_id), None, "paused", None);
        self.emit_workflow(EventType::WorkflowPaused, workflow_id, json!({}));
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn resume_workflow(&self, workflow_id: Uuid) -> OrchestratorResult<()> {
        let handle = self.active_handle(workflow_id)?;
        self.commit(&handle, |execution| execution.resume()).await?;
        handle.control.notify_waiters();

        log_workflow_operation("resume", Some(workflow_id), None, "in_progress", None);
        self.emit_workflow(EventType::WorkflowResumed, workflow_id, json!({}));
        Ok(())
    }

    /// Cancel an active workflow and release its capacity
    ///
    /// An executor call already in flight is not interrupted; its result is discarded.
    #[instrument(skip(self))]
    pub async fn cancel_workflow(&self, workflow_id: Uuid) -> OrchestratorResult<()> {
        let handle = self.active_handle(workflow_id)?;
        self.commit(&handle, |execution| execution.cancel()).await?;
        handle.control.notify_waiters();
        self.retire(workflow_id);

        self.inner.metrics.workflow_cancelled();
        log_workflow_operation("cancel", Some(workflow_id), None, "cancelled", None);
        self.emit_workflow(EventType::WorkflowCancelled, workflow_id, json!({}));
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Status of any workflow known to the store, active or not
    pub async fn get_execution_status(&self, workflow_id: Uuid) -> OrchestratorResult<ExecutionStatus> {
        Ok(self.get_execution(workflow_id).await?.status().clone())
    }

    /// Full stored record of a workflow
    pub async fn get_execution(&self, workflow_id: Uuid) -> OrchestratorResult<WorkflowExecution> {
        self.inner
            .store
            .find_by_id(workflow_id)
            .await?
            .ok_or(OrchestratorError::NotFound { workflow_id })
    }

    /// Identifiers of workflows currently tracked in memory
    pub fn get_active_executions(&self) -> Vec<Uuid> {
        self.inner.active.lock().keys().copied().collect()
    }

    pub fn active_execution_count(&self) -> usize {
        self.inner.active.lock().len()
    }
}
