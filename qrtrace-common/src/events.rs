//! Event types for the qrtrace event system
//!
//! Scan sessions report their lifecycle on an [`EventBus`] so a display layer
//! (terminal output, a web view) can follow progress without polling the
//! session itself.

use crate::scan::{EntityKind, ScanMethod, ScanStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// qrtrace event types
///
/// Serialized with a `type` tag so they can be forwarded as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// A scanner view opened a new session
    SessionStarted {
        session_id: Uuid,
        method: ScanMethod,
        timestamp: DateTime<Utc>,
    },

    /// Session moved between statuses
    StatusChanged {
        session_id: Uuid,
        old_status: ScanStatus,
        new_status: ScanStatus,
        timestamp: DateTime<Utc>,
    },

    /// Camera stream acquired, polling begins
    CaptureStarted {
        session_id: Uuid,
        poll_interval_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Polling ended and the camera was released
    CaptureStopped {
        session_id: Uuid,
        /// True if the loop ended because a code was found
        detected: bool,
        ticks: u64,
        timestamp: DateTime<Utc>,
    },

    /// A payload normalized to a hash
    HashResolved {
        session_id: Uuid,
        qr_hash: String,
        timestamp: DateTime<Utc>,
    },

    /// Lookup returned a record
    Verified {
        session_id: Uuid,
        qr_hash: String,
        entity_kind: EntityKind,
        entity_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A stage failed; message is what the user sees
    ScanFailed {
        session_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// "Scan another": session state cleared
    SessionReset {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl ScanEvent {
    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            ScanEvent::SessionStarted { session_id, .. }
            | ScanEvent::StatusChanged { session_id, .. }
            | ScanEvent::CaptureStarted { session_id, .. }
            | ScanEvent::CaptureStopped { session_id, .. }
            | ScanEvent::HashResolved { session_id, .. }
            | ScanEvent::Verified { session_id, .. }
            | ScanEvent::ScanFailed { session_id, .. }
            | ScanEvent::SessionReset { session_id, .. } => *session_id,
        }
    }
}

/// Broadcast bus for [`ScanEvent`]s
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    ///
    /// # Examples
    ///
    /// ```
    /// use qrtrace_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(64);
    /// assert_eq!(event_bus.capacity(), 64);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no one is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: ScanEvent) -> Result<usize, broadcast::error::SendError<ScanEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
