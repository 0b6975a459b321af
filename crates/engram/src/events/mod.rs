//! Memory event hooks
//!
//! Structured notifications emitted after a successful episode write and
//! after a successful consolidation run, for cross-component awareness
//! (hook scripts, the dashboard's SSE stream). Delivery is
//! fire-and-forget: a send with no subscribers is not an error and never
//! rolls back the underlying write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default buffer size for the broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    EpisodeRecorded,
    ConsolidationCompleted,
}

/// A structured notification about a memory-state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub event: EventKind,
    pub namespace: String,
    /// The episode written, or a pattern touched by consolidation
    pub entity_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl MemoryEvent {
    pub fn episode_recorded(namespace: impl Into<String>, id: Uuid) -> Self {
        Self {
            event: EventKind::EpisodeRecorded,
            namespace: namespace.into(),
            entity_id: Some(id),
            at: Utc::now(),
        }
    }

    pub fn consolidation_completed(namespace: impl Into<String>, pattern_id: Option<Uuid>) -> Self {
        Self {
            event: EventKind::ConsolidationCompleted,
            namespace: namespace.into(),
            entity_id: pattern_id,
            at: Utc::now(),
        }
    }
}

/// Fan-out bus for memory events, backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MemoryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to whoever is listening. Lagging or absent
    /// subscribers are ignored.
    pub fn emit(&self, event: MemoryEvent) {
        tracing::debug!(
            event = ?event.event,
            namespace = %event.namespace,
            "Emitting memory event"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
