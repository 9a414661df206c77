//! # Stage Executors
//!
//! The pluggable executor contract and the stage-keyed registry the orchestrator
//! resolves executors from.

pub mod contract;
pub mod registry;

pub use contract::{
    ExecutorDescriptor, PriorStageOutput, StageError, StageExecutor, StageInput, StageOutput,
};
pub use registry::{AdapterRegistry, SharedExecutor};
