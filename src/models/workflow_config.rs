//! # Workflow Configuration
//!
//! Immutable description of one orchestration run: which stages to drive, in which
//! mode, and under which timeout and retry policy.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How the configured stages are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One stage at a time, in configuration order, each seeing prior outputs
    #[default]
    Sequential,
    /// All stages at once, no ordering and no inter-stage chaining
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// Bounded retry policy applied to every stage of a workflow
///
/// `max_attempts` counts retries, not total calls: a stage that keeps failing is
/// invoked at most `max_attempts + 1` times across the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(default)]
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Reasons a workflow configuration is rejected at submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowConfigError {
    #[error("workflow name must not be empty")]
    EmptyName,

    #[error("workflow must declare at least one stage")]
    NoStages,

    #[error("stage identifiers must not be empty")]
    EmptyStageId,

    #[error("stage {0} is declared more than once")]
    DuplicateStage(String),

    #[error("skip stage {0} is not declared in the workflow stages")]
    UnknownSkipStage(String),

    #[error("workflow timeout must be greater than zero")]
    ZeroTimeout,
}

/// Configuration supplied with a workflow submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    pub stages: Vec<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Overall budget for the run
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    /// Stages marked skipped before execution begins
    #[serde(default)]
    pub skip_stages: Vec<String>,
}

impl WorkflowConfig {
    /// Create a sequential configuration with no timeout and no retries
    pub fn new<I, S>(name: impl Into<String>, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            stages: stages.into_iter().map(Into::into).collect(),
            execution_mode: ExecutionMode::Sequential,
            timeout_ms: None,
            retry_policy: None,
            skip_stages: Vec::new(),
        }
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn parallel(self) -> Self {
        self.with_execution_mode(ExecutionMode::Parallel)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_skip_stages<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_stages = stages.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Check whether a stage is declared in this configuration
    pub fn declares(&self, stage: &str) -> bool {
        self.stages.iter().any(|s| s == stage)
    }

    /// Validate the configuration before anything is persisted
    pub fn validate(&self) -> Result<(), WorkflowConfigError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowConfigError::EmptyName);
        }
        if self.stages.is_empty() {
            return Err(WorkflowConfigError::NoStages);
        }

        let mut seen = HashSet::with_capacity(self.stages.len());
        for stage in &self.stages {
            if stage.trim().is_empty() {
                return Err(WorkflowConfigError::EmptyStageId);
            }
            if !seen.insert(stage.as_str()) {
                return Err(WorkflowConfigError::DuplicateStage(stage.clone()));
            }
        }

        if let Some(unknown) = self.skip_stages.iter().find(|s| !seen.contains(s.as_str())) {
            return Err(WorkflowConfigError::UnknownSkipStage(unknown.clone()));
        }

        if self.timeout_ms == Some(0) {
            return Err(WorkflowConfigError::ZeroTimeout);
        }

        Ok(())
    }
}
