//! Shared mocks for orchestrator integration tests.
//!
//! Not every test binary uses every mock.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use stage_orchestrator::{
    ExecutionContext, ExecutionFilter, ExecutionStore, ExecutorDescriptor, InMemoryExecutionStore,
    Orchestrator, OrchestratorConfig, StageError, StageExecutor, StageInput, StageOutput,
    StageStatus, StoreError, StoreResult, WorkflowExecution, WorkflowStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

pub fn descriptor(stage: &str) -> ExecutorDescriptor {
    ExecutorDescriptor {
        name: format!("{stage}-module"),
        version: "1.0.0".to_string(),
        stage: stage.to_string(),
        description: format!("Test executor for {stage}"),
    }
}

pub fn context() -> ExecutionContext {
    ExecutionContext::new("ctx-test")
        .with_user("user-1")
        .with_session("session-1")
}

pub fn orchestrator() -> Orchestrator {
    orchestrator_with(OrchestratorConfig::default())
}

pub fn orchestrator_with(config: OrchestratorConfig) -> Orchestrator {
    Orchestrator::with_in_memory_store(config).expect("valid orchestrator config")
}

/// Succeeds and records every input it receives
#[derive(Debug)]
pub struct RecordingExecutor {
    stage: String,
    calls: parking_lot::Mutex<Vec<StageInput>>,
}

impl RecordingExecutor {
    pub fn new(stage: &str) -> Arc<Self> {
        Arc::new(Self {
            stage: stage.to_string(),
            calls: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<StageInput> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl StageExecutor for RecordingExecutor {
    async fn execute(&self, input: StageInput) -> Result<StageOutput, StageError> {
        let output = json!({ "stage": self.stage, "attempt": input.attempt });
        self.calls.lock().push(input);
        Ok(StageOutput::success(output))
    }

    async fn status(&self) -> Result<StageStatus, StageError> {
        Ok(StageStatus::Pending)
    }

    fn describe(&self) -> ExecutorDescriptor {
        descriptor(&self.stage)
    }
}

/// Reports `success: false` with a fixed message
#[derive(Debug)]
pub struct FailingExecutor {
    stage: String,
    message: String,
    attempts: AtomicU32,
}

impl FailingExecutor {
    pub fn new(stage: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            stage: stage.to_string(),
            message: message.to_string(),
            attempts: AtomicU32::new(0),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for FailingExecutor {
    async fn execute(&self, _input: StageInput) -> Result<StageOutput, StageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(StageOutput::failure(self.message.clone()))
    }

    async fn status(&self) -> Result<StageStatus, StageError> {
        Err(StageError::Execution("status unavailable".to_string()))
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn describe(&self) -> ExecutorDescriptor {
        descriptor(&self.stage)
    }
}

/// Returns an `Err` from `execute`
#[derive(Debug)]
pub struct ErroringExecutor {
    stage: String,
    message: String,
}

impl ErroringExecutor {
    pub fn new(stage: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            stage: stage.to_string(),
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl StageExecutor for ErroringExecutor {
    async fn execute(&self, _input: StageInput) -> Result<StageOutput, StageError> {
        Err(StageError::Execution(self.message.clone()))
    }

    async fn status(&self) -> Result<StageStatus, StageError> {
        Ok(StageStatus::Pending)
    }

    fn describe(&self) -> ExecutorDescriptor {
        descriptor(&self.stage)
    }
}

/// Panics in every method that can panic
#[derive(Debug)]
pub struct PanickingExecutor {
    stage: String,
}

impl PanickingExecutor {
    pub fn new(stage: &str) -> Arc<Self> {
        Arc::new(Self {
            stage: stage.to_string(),
        })
    }
}

#[async_trait]
impl StageExecutor for PanickingExecutor {
    async fn execute(&self, _input: StageInput) -> Result<StageOutput, StageError> {
        panic!("executor exploded");
    }

    async fn status(&self) -> Result<StageStatus, StageError> {
        panic!("status exploded");
    }

    fn describe(&self) -> ExecutorDescriptor {
        descriptor(&self.stage)
    }
}

/// Fails the first `failures` calls, then succeeds
#[derive(Debug)]
pub struct FlakyExecutor {
    stage: String,
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyExecutor {
    pub fn new(stage: &str, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            stage: stage.to_string(),
            failures,
            attempts: AtomicU32::new(0),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for FlakyExecutor {
    async fn execute(&self, input: StageInput) -> Result<StageOutput, StageError> {
        let call = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Ok(StageOutput::failure(format!("transient failure {call}")))
        } else {
            Ok(StageOutput::success(json!({ "attempt": input.attempt })))
        }
    }

    async fn status(&self) -> Result<StageStatus, StageError> {
        Ok(StageStatus::Pending)
    }

    fn describe(&self) -> ExecutorDescriptor {
        descriptor(&self.stage)
    }
}

/// Sleeps before succeeding
#[derive(Debug)]
pub struct SlowExecutor {
    stage: String,
    delay: Duration,
    attempts: AtomicU32,
}

impl SlowExecutor {
    pub fn new(stage: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            stage: stage.to_string(),
            delay,
            attempts: AtomicU32::new(0),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for SlowExecutor {
    async fn execute(&self, _input: StageInput) -> Result<StageOutput, StageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(StageOutput::success(json!({ "stage": self.stage })))
    }

    async fn status(&self) -> Result<StageStatus, StageError> {
        Ok(StageStatus::Running)
    }

    fn describe(&self) -> ExecutorDescriptor {
        descriptor(&self.stage)
    }
}

/// Blocks every call until the test opens the gate
#[derive(Debug)]
pub struct GatedExecutor {
    stage: String,
    started: Notify,
    gate: Semaphore,
    calls: AtomicU32,
}

impl GatedExecutor {
    pub fn new(stage: &str) -> Arc<Self> {
        Arc::new(Self {
            stage: stage.to_string(),
            started: Notify::new(),
            gate: Semaphore::new(0),
            calls: AtomicU32::new(0),
        })
    }

    /// Wait until a call is inside `execute`
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Let one blocked call finish
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for GatedExecutor {
    async fn execute(&self, _input: StageInput) -> Result<StageOutput, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| StageError::Execution(e.to_string()))?;
        permit.forget();
        Ok(StageOutput::success(json!({ "stage": self.stage, "gated": true })))
    }

    async fn status(&self) -> Result<StageStatus, StageError> {
        Ok(StageStatus::Running)
    }

    fn describe(&self) -> ExecutorDescriptor {
        descriptor(&self.stage)
    }
}

/// In-memory store that can be told to refuse writes
#[derive(Debug, Clone, Default)]
pub struct FailingStore {
    inner: InMemoryExecutionStore,
    fail_save: Arc<AtomicBool>,
    fail_update: Arc<AtomicBool>,
    /// Refuse only updates that record this workflow status
    fail_update_on: Arc<parking_lot::Mutex<Option<WorkflowStatus>>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }

    pub fn fail_updates(&self) {
        self.fail_update.store(true, Ordering::SeqCst);
    }

    pub fn fail_updates_to(&self, status: WorkflowStatus) {
        *self.fail_update_on.lock() = Some(status);
    }

    pub fn backing(&self) -> &InMemoryExecutionStore {
        &self.inner
    }
}

#[async_trait]
impl ExecutionStore for FailingStore {
    async fn save(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("database connection lost".to_string()));
        }
        self.inner.save(execution).await
    }

    async fn find_by_id(&self, workflow_id: Uuid) -> StoreResult<Option<WorkflowExecution>> {
        self.inner.find_by_id(workflow_id).await
    }

    async fn update(&self, execution: &WorkflowExecution) -> StoreResult<()> {
        let refused_status = *self.fail_update_on.lock();
        if self.fail_update.load(Ordering::SeqCst)
            || refused_status == Some(execution.current_status())
        {
            return Err(StoreError::Backend("disk quota exceeded".to_string()));
        }
        self.inner.update(execution).await
    }

    async fn find_by_filter(&self, filter: &ExecutionFilter) -> StoreResult<Vec<WorkflowExecution>> {
        self.inner.find_by_filter(filter).await
    }

    async fn count_by_status(&self) -> StoreResult<HashMap<WorkflowStatus, usize>> {
        self.inner.count_by_status().await
    }

    async fn batch_update_status(&self, ids: &[Uuid], status: WorkflowStatus) -> StoreResult<usize> {
        self.inner.batch_update_status(ids, status).await
    }

    async fn cleanup_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        self.inner.cleanup_expired(cutoff).await
    }
}

/// Poll until `check` holds or a second passes
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
