//! View invalidation events.
//!
//! Mutations that change what a listing shows broadcast an event naming the
//! affected view; connected clients re-fetch it.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Path of the admin users listing.
pub const USERS_VIEW: &str = "/admin/users";

/// UI event types that can be broadcast to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// The set of users, or a user's visible fields, changed.
    UsersChanged {
        /// View to re-fetch.
        path: String,
    },
}

impl UiEvent {
    /// Invalidation of the admin users listing.
    #[must_use]
    pub fn users_changed() -> Self {
        Self::UsersChanged {
            path: USERS_VIEW.to_string(),
        }
    }

    /// SSE event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UsersChanged { .. } => "users_changed",
        }
    }
}

/// A wrapper for UI events with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiEventEnvelope {
    /// Event ID.
    pub id: String,
    /// Timestamp.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub event: UiEvent,
}

impl UiEventEnvelope {
    /// Create a new event envelope.
    #[must_use]
    pub fn new(event: UiEvent) -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);

        Self {
            id: hex::encode(bytes),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Default channel capacity for event broadcasts.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Event broadcaster for distributing UI events to subscribers.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<UiEventEnvelope>,
}

impl EventBroadcaster {
    /// Create a new event broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event broadcaster with custom capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn broadcast(&self, event: UiEvent) -> usize {
        let envelope = UiEventEnvelope::new(event);
        // No subscribers is not an error
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to receive events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UiEventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
