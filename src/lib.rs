#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Stage Orchestrator
//!
//! Coordination kernel for multi-stage workflows.
//!
//! ## Overview
//!
//! A workflow is a named, ordered list of stages. Each stage is delegated to a
//! pluggable [`StageExecutor`] registered under the stage's identifier. The
//! [`Orchestrator`] admits workflows against a global concurrency cap, drives
//! them sequentially or in parallel, applies per-call timeouts and bounded
//! retries, persists every transition through an [`ExecutionStore`], and exposes
//! cooperative pause/resume/cancel plus a lifecycle event feed.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Workflow lifecycle and per-stage status
//! - [`models`] - Workflow configuration, caller context, stage results
//! - [`executor`] - Executor contract and registry
//! - [`store`] - Persistence contract and in-memory store
//! - [`orchestration`] - The orchestrator service
//! - [`events`] - Lifecycle events and listeners
//! - [`config`] - Orchestrator configuration loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use stage_orchestrator::{
//!     ExecutionContext, ExecutorDescriptor, Orchestrator, OrchestratorConfig, StageError,
//!     StageExecutor, StageInput, StageOutput, StageStatus, WorkflowConfig,
//! };
//! use std::sync::Arc;
//!
//! struct ContextStage;
//!
//! #[async_trait]
//! impl StageExecutor for ContextStage {
//!     async fn execute(&self, input: StageInput) -> Result<StageOutput, StageError> {
//!         Ok(StageOutput::success(serde_json::json!({ "context": input.context.context_id })))
//!     }
//!
//!     async fn status(&self) -> Result<StageStatus, StageError> {
//!         Ok(StageStatus::Pending)
//!     }
//!
//!     fn describe(&self) -> ExecutorDescriptor {
//!         ExecutorDescriptor {
//!             name: "context".into(),
//!             version: "1.0.0".into(),
//!             stage: "context".into(),
//!             description: "Builds the shared context".into(),
//!         }
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::with_in_memory_store(OrchestratorConfig::default())?;
//! orchestrator.register_adapter("context", Arc::new(ContextStage));
//!
//! let status = orchestrator
//!     .execute_workflow(ExecutionContext::new("ctx-1"), WorkflowConfig::new("W", ["context"]))
//!     .await?;
//! assert_eq!(status.completed_stages, vec!["context".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod store;

pub use config::{ConfigManager, ConfigurationError, OrchestratorConfig};
pub use error::{OrchestratorError, OrchestratorResult};
pub use events::{EventBus, EventType, ListenerError, ListenerId, OrchestratorEvent};
pub use executor::{
    AdapterRegistry, ExecutorDescriptor, PriorStageOutput, SharedExecutor, StageError,
    StageExecutor, StageInput, StageOutput,
};
pub use models::{
    ExecutionContext, ExecutionMode, Priority, RetryPolicy, StageResult, WorkflowConfig,
    WorkflowConfigError,
};
pub use orchestration::{
    HealthReport, HealthStatus, HookError, LifecycleHooks, MetricsSnapshot, ModuleHealth,
    Orchestrator, RegistrationReport,
};
pub use state_machine::{
    ExecutionStatus, LifecycleEvent, StageStatus, StateMachineError, WorkflowExecution,
    WorkflowStatus,
};
pub use store::{ExecutionFilter, ExecutionStore, InMemoryExecutionStore, StoreError, StoreResult};
