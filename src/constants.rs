//! # System Constants
//!
//! Event names, error codes and the operational defaults of the orchestrator.

/// Lifecycle event names
pub mod events {
    // Workflow lifecycle events
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
    pub const WORKFLOW_PAUSED: &str = "workflow.paused";
    pub const WORKFLOW_RESUMED: &str = "workflow.resumed";
    pub const WORKFLOW_CANCELLED: &str = "workflow.cancelled";

    // Stage lifecycle events
    pub const STAGE_STARTED: &str = "stage.started";
    pub const STAGE_COMPLETED: &str = "stage.completed";
    pub const STAGE_FAILED: &str = "stage.failed";
    pub const STAGE_RETRYING: &str = "stage.retrying";
    pub const STAGE_SKIPPED: &str = "stage.skipped";
}

/// Error codes recorded on failed stages that never reached an executor
pub mod error_codes {
    pub const ADAPTER_MISSING: &str = "ADAPTER_MISSING";
    pub const PERSISTENCE_FAILED: &str = "PERSISTENCE_FAILED";
}

/// Listener key matching every event type
pub const WILDCARD_EVENT: &str = "*";

/// Listener key prefix for stage-scoped listeners
pub const STAGE_LISTENER_PREFIX: &str = "stage:";

/// Reason recorded on stages listed in `skip_stages`
pub const CONFIGURED_SKIP_REASON: &str = "skipped by workflow configuration";

pub const DEFAULT_MODULE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 10;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Prefix for `ORCHESTRATOR_*` environment overrides
pub const ENV_PREFIX: &str = "ORCHESTRATOR";

/// Base name of configuration files (`orchestrator.toml`, `orchestrator.production.yaml`, ...)
pub const CONFIG_FILE_STEM: &str = "orchestrator";
