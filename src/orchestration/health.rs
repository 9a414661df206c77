//! Registration audit and health reporting types.

use crate::executor::ExecutorDescriptor;
use crate::state_machine::StageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate health of the registered executors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy when every module passes (or none are registered), unhealthy when none do
    pub fn from_modules(modules: &[ModuleHealth]) -> Self {
        let healthy = modules.iter().filter(|m| m.healthy).count();
        if healthy == modules.len() {
            Self::Healthy
        } else if healthy == 0 {
            Self::Unhealthy
        } else {
            Self::Degraded
        }
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

/// Health check result for one registered executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleHealth {
    pub stage: String,
    pub healthy: bool,
    pub status: StageStatus,
    /// Absent when `describe()` panicked
    pub descriptor: Option<ExecutorDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub orchestrator_id: Uuid,
    pub status: HealthStatus,
    pub modules: Vec<ModuleHealth>,
    pub active_executions: usize,
    pub uptime_seconds: u64,
    pub checked_at: DateTime<Utc>,
}

/// Which required stages have an executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReport {
    pub is_complete: bool,
    pub missing_stages: Vec<String>,
    pub registered_stages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(healthy: bool) -> ModuleHealth {
        ModuleHealth {
            stage: "s".to_string(),
            healthy,
            status: StageStatus::Pending,
            descriptor: None,
        }
    }

    #[test]
    fn test_overall_status() {
        assert_eq!(HealthStatus::from_modules(&[]), HealthStatus::Healthy);
        assert_eq!(
            HealthStatus::from_modules(&[module(true), module(true)]),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthStatus::from_modules(&[module(true), module(false)]),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::from_modules(&[module(false)]),
            HealthStatus::Unhealthy
        );
        assert!(!HealthStatus::Unhealthy.is_operational());
    }
}
