//! Event types and broadcast bus for the Taleweaver event system
//!
//! Render jobs report durable state through the database; events exist so
//! that connected observers (SSE clients) can watch progress live without
//! polling. Delivery is lossy: a slow or absent subscriber never blocks the
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Taleweaver event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TwEvent {
    /// A render job was accepted and queued for background processing
    RenderJobQueued {
        purchase_id: String,
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A render job advanced to a new pipeline step
    RenderStepChanged {
        purchase_id: String,
        step: String,
        timestamp: DateTime<Utc>,
    },

    /// A render job finished and its artifact was uploaded
    RenderJobCompleted {
        purchase_id: String,
        artifact_key: String,
        timestamp: DateTime<Utc>,
    },

    /// A render job failed terminally
    RenderJobFailed {
        purchase_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl TwEvent {
    /// Event type name used for SSE event framing and logging
    pub fn event_type(&self) -> &'static str {
        match self {
            TwEvent::RenderJobQueued { .. } => "RenderJobQueued",
            TwEvent::RenderStepChanged { .. } => "RenderStepChanged",
            TwEvent::RenderJobCompleted { .. } => "RenderJobCompleted",
            TwEvent::RenderJobFailed { .. } => "RenderJobFailed",
        }
    }

    /// Purchase id the event refers to
    pub fn purchase_id(&self) -> &str {
        match self {
            TwEvent::RenderJobQueued { purchase_id, .. }
            | TwEvent::RenderStepChanged { purchase_id, .. }
            | TwEvent::RenderJobCompleted { purchase_id, .. }
            | TwEvent::RenderJobFailed { purchase_id, .. } => purchase_id,
        }
    }
}

/// Broadcast event bus shared between the pipeline and SSE handlers
///
/// Wraps tokio::broadcast, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TwEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TwEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: TwEvent) -> Result<usize, broadcast::error::SendError<TwEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the absence of subscribers
    ///
    /// The database row is the durable record; events are observability
    /// only, so nobody listening is a normal condition.
    pub fn emit_lossy(&self, event: TwEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event emitted with no active subscribers");
        }
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
