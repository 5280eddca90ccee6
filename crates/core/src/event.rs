//! Domain event system: decoupled observation of turns and threads.
//!
//! Events are published when something interesting happens in the system.
//! The gateway relays them to operators; nothing in the turn path depends
//! on anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ThreadCreated {
        thread_id: String,
        owner_id: String,
        timestamp: DateTime<Utc>,
    },

    ThreadRenamed {
        thread_id: String,
        title: String,
        timestamp: DateTime<Utc>,
    },

    ThreadDisabled {
        thread_id: String,
        timestamp: DateTime<Utc>,
    },

    TurnStarted {
        thread_id: String,
        model: String,
        timestamp: DateTime<Utc>,
    },

    ToolExecuted {
        thread_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TurnCompleted {
        thread_id: String,
        tool_calls: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A turn ended in a fatal error or was cancelled
    TurnFailed {
        thread_id: String,
        kind: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::ThreadCreated { .. } => "thread_created",
            DomainEvent::ThreadRenamed { .. } => "thread_renamed",
            DomainEvent::ThreadDisabled { .. } => "thread_disabled",
            DomainEvent::TurnStarted { .. } => "turn_started",
            DomainEvent::ToolExecuted { .. } => "tool_executed",
            DomainEvent::TurnCompleted { .. } => "turn_completed",
            DomainEvent::TurnFailed { .. } => "turn_failed",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
