//! Lifecycle event types and the in-process event bus.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventListener, ListenerError, ListenerId};
pub use types::{EventType, OrchestratorEvent};
