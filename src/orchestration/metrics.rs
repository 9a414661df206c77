//! # Orchestrator Metrics
//!
//! Lock-free counters for workflow and stage activity. When metrics are disabled
//! every counter stays at zero.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct OrchestratorMetrics {
    enabled: bool,
    workflows_submitted: AtomicU64,
    workflows_rejected: AtomicU64,
    workflows_completed: AtomicU64,
    workflows_failed: AtomicU64,
    workflows_cancelled: AtomicU64,
    stage_attempts: AtomicU64,
    stage_retries: AtomicU64,
    stage_timeouts: AtomicU64,
    stage_failures: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub workflows_submitted: u64,
    pub workflows_rejected: u64,
    pub workflows_completed: u64,
    pub workflows_failed: u64,
    pub workflows_cancelled: u64,
    pub stage_attempts: u64,
    pub stage_retries: u64,
    pub stage_timeouts: u64,
    pub stage_failures: u64,
}

impl OrchestratorMetrics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn bump(&self, counter: &AtomicU64) {
        if self.enabled {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn workflow_submitted(&self) {
        self.bump(&self.workflows_submitted);
    }

    pub fn workflow_rejected(&self) {
        self.bump(&self.workflows_rejected);
    }

    pub fn workflow_completed(&self) {
        self.bump(&self.workflows_completed);
    }

    pub fn workflow_failed(&self) {
        self.bump(&self.workflows_failed);
    }

    pub fn workflow_cancelled(&self) {
        self.bump(&self.workflows_cancelled);
    }

    pub fn stage_attempted(&self) {
        self.bump(&self.stage_attempts);
    }

    pub fn stage_retried(&self) {
        self.bump(&self.stage_retries);
    }

    pub fn stage_timed_out(&self) {
        self.bump(&self.stage_timeouts);
    }

    pub fn stage_failed(&self) {
        self.bump(&self.stage_failures);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            workflows_submitted: self.workflows_submitted.load(Ordering::Relaxed),
            workflows_rejected: self.workflows_rejected.load(Ordering::Relaxed),
            workflows_completed: self.workflows_completed.load(Ordering::Relaxed),
            workflows_failed: self.workflows_failed.load(Ordering::Relaxed),
            workflows_cancelled: self.workflows_cancelled.load(Ordering::Relaxed),
            stage_attempts: self.stage_attempts.load(Ordering::Relaxed),
            stage_retries: self.stage_retries.load(Ordering::Relaxed),
            stage_timeouts: self.stage_timeouts.load(Ordering::Relaxed),
            stage_failures: self.stage_failures.load(Ordering::Relaxed),
        }
    }
}
