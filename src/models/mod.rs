//! # Data Model
//!
//! Submission-side types of a workflow run: the immutable configuration and caller
//! context, and the per-stage result record kept on the execution.

pub mod execution_context;
pub mod stage_result;
pub mod workflow_config;

pub use execution_context::{ExecutionContext, Priority};
pub use stage_result::StageResult;
pub use workflow_config::{ExecutionMode, RetryPolicy, WorkflowConfig, WorkflowConfigError};
