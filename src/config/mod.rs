//! # Orchestrator Configuration
//!
//! Runtime options of the orchestrator service. Values come from defaults,
//! optional `orchestrator.*` files and `ORCHESTRATOR_*` environment variables,
//! layered by [`ConfigManager`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stage_orchestrator::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().module_timeout();
//! # let _ = timeout;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{
    DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_MAX_CONCURRENT_EXECUTIONS, DEFAULT_MODULE_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Orchestrator service options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-call executor timeout
    pub module_timeout_ms: u64,
    /// Global admission cap on in-flight workflows
    pub max_concurrent_executions: usize,
    pub enable_metrics: bool,
    pub enable_events: bool,
    /// Buffer of the broadcast event channel
    pub event_channel_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            module_timeout_ms: DEFAULT_MODULE_TIMEOUT_MS,
            max_concurrent_executions: DEFAULT_MAX_CONCURRENT_EXECUTIONS,
            enable_metrics: true,
            enable_events: true,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl OrchestratorConfig {
    pub fn module_timeout(&self) -> Duration {
        Duration::from_millis(self.module_timeout_ms)
    }

    pub fn with_module_timeout(mut self, timeout: Duration) -> Self {
        self.module_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_concurrent_executions(mut self, limit: usize) -> Self {
        self.max_concurrent_executions = limit;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    pub fn with_events(mut self, enabled: bool) -> Self {
        self.enable_events = enabled;
        self
    }

    /// Reject values the orchestrator cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.module_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "module_timeout_ms",
                "0",
                "executor timeout must be greater than zero",
            ));
        }
        if self.max_concurrent_executions == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_concurrent_executions",
                "0",
                "at least one concurrent execution must be allowed",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "event_channel_capacity",
                "0",
                "event channel needs room for at least one event",
            ));
        }
        Ok(())
    }
}
