//! Stage-keyed executor registry.

use super::contract::StageExecutor;
use dashmap::DashMap;
use std::sync::Arc;

/// Shared executor handle
pub type SharedExecutor = Arc<dyn StageExecutor>;

/// One executor per stage identifier; re-registration replaces the prior entry
#[derive(Default)]
pub struct AdapterRegistry {
    executors: DashMap<String, SharedExecutor>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            executors: DashMap::new(),
        }
    }

    /// Register an executor, returning the one it replaced
    pub fn register(&self, stage: impl Into<String>, executor: SharedExecutor) -> Option<SharedExecutor> {
        self.executors.insert(stage.into(), executor)
    }

    pub fn unregister(&self, stage: &str) -> Option<SharedExecutor> {
        self.executors.remove(stage).map(|(_, executor)| executor)
    }

    pub fn get(&self, stage: &str) -> Option<SharedExecutor> {
        self.executors.get(stage).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.executors.contains_key(stage)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Registered stage identifiers, sorted
    pub fn stages(&self) -> Vec<String> {
        let mut stages: Vec<String> = self.executors.iter().map(|e| e.key().clone()).collect();
        stages.sort();
        stages
    }

    /// Owned copy of every entry, safe to hold across await points
    pub fn snapshot(&self) -> Vec<(String, SharedExecutor)> {
        let mut entries: Vec<(String, SharedExecutor)> = self
            .executors
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Stages from `required` that have no executor, in the given order
    pub fn missing<'a, I>(&self, required: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        required
            .into_iter()
            .filter(|stage| !self.executors.contains_key(stage.as_str()))
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("stages", &self.stages())
            .finish()
    }
}
