//! # State Machine
//!
//! Workflow lifecycle and per-stage status tracking. The overall lifecycle is
//! `created -> in_progress <-> paused -> {completed, failed, cancelled}`; every
//! transition is validated before anything changes.

pub mod errors;
pub mod events;
pub mod states;
pub mod workflow_execution;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::LifecycleEvent;
pub use states::{StageStatus, WorkflowStatus};
pub use workflow_execution::{ExecutionStatus, WorkflowExecution};
