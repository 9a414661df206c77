//! # Orchestration
//!
//! The orchestrator service and its supporting pieces: admission control, the
//! panic-isolating stage runner, lifecycle hooks, metrics and health reporting.

pub mod admission;
pub mod health;
pub mod hooks;
pub mod metrics;
pub mod orchestrator;
pub mod stage_runner;

pub use admission::{AdmissionController, AdmissionPermit};
pub use health::{HealthReport, HealthStatus, ModuleHealth, RegistrationReport};
pub use hooks::{HookError, LifecycleHooks};
pub use metrics::{MetricsSnapshot, OrchestratorMetrics};
pub use orchestrator::Orchestrator;
pub use stage_runner::StageRunner;
