//! # Event Bus
//!
//! In-process publish/subscribe for orchestrator lifecycle events. Listeners are
//! keyed by event name, by stage, or the `*` wildcard, and run synchronously at
//! the point of emission. A broadcast channel carries the same events to async subscribers.

use super::types::{EventType, OrchestratorEvent};
use crate::constants::{STAGE_LISTENER_PREFIX, WILDCARD_EVENT};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Error a listener may report; it is logged and never stops the run
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Synchronous event listener
pub type EventListener = Arc<dyn Fn(&OrchestratorEvent) -> Result<(), ListenerError> + Send + Sync>;

/// Handle returned by registration, used to remove a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Keyed listeners plus a broadcast channel
#[derive(Clone)]
pub struct EventBus {
    enabled: bool,
    sender: broadcast::Sender<OrchestratorEvent>,
    listeners: Arc<RwLock<HashMap<String, Vec<(ListenerId, EventListener)>>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize, enabled: bool) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            enabled,
            sender,
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Register a listener for one event type
    pub fn add_listener<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(&OrchestratorEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.insert(event_type.as_str(), Arc::new(listener))
    }

    /// Register a listener for every event type
    pub fn add_global_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&OrchestratorEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.insert(WILDCARD_EVENT, Arc::new(listener))
    }

    /// Register a listener for every event concerning one stage
    pub fn add_stage_listener<F>(&self, stage: &str, listener: F) -> ListenerId
    where
        F: Fn(&OrchestratorEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.insert(&stage_key(stage), Arc::new(listener))
    }

    fn insert(&self, key: &str, listener: EventListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(key.to_string())
            .or_default()
            .push((id, listener));
        debug!(event_type = key, listener_id = id.0, "Event listener registered");
        id
    }

    /// Remove a listener; returns false when it was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let mut removed = false;
        for entries in listeners.values_mut() {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            removed |= entries.len() != before;
        }
        listeners.retain(|_, entries| !entries.is_empty());
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    /// Deliver an event to its listeners, then to broadcast subscribers
    pub fn emit(&self, event: OrchestratorEvent) {
        if !self.enabled {
            return;
        }

        // Clone out of the lock so a listener may register or remove listeners.
        let stage = event.stage.as_deref().map(stage_key);
        let targets: Vec<EventListener> = {
            let listeners = self.listeners.read();
            [Some(event.event_type.as_str()), Some(WILDCARD_EVENT), stage.as_deref()]
                .into_iter()
                .flatten()
                .filter_map(|key| listeners.get(key))
                .flat_map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)))
                .collect()
        };

        for listener in targets {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    event_type = %event.event_type,
                    workflow_id = %event.workflow_id,
                    error = %e,
                    "Event listener returned an error"
                ),
                Err(_) => warn!(
                    event_type = %event.event_type,
                    workflow_id = %event.workflow_id,
                    "Event listener panicked"
                ),
            }
        }

        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}

fn stage_key(stage: &str) -> String {
    format!("{STAGE_LISTENER_PREFIX}{stage}")
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_EVENT_CHANNEL_CAPACITY, true)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("enabled", &self.enabled)
            .field("listener_count", &self.listener_count())
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
