//! Event types for the GigFlow event system
//!
//! Domain events are broadcast on a bounded channel. Slow subscribers lose the
//! oldest events rather than blocking producers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// GigFlow event types
///
/// Serialized with a `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GigEvent {
    /// A webhook delivery produced a new booking
    EnquiryIngested {
        booking_id: Uuid,
        user_id: String,
        source_message_id: String,
        confidence: f64,
        needs_review: bool,
        timestamp: DateTime<Utc>,
    },

    /// A redelivered webhook matched an existing booking
    DuplicateDelivery {
        booking_id: Uuid,
        user_id: String,
        source_message_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Extraction degraded to heuristics after an AI failure
    ExtractionDegraded {
        source_message_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Booking status moved through a lifecycle action
    BookingStatusChanged {
        booking_id: Uuid,
        user_id: String,
        action: String,
        old_status: String,
        new_status: String,
        timestamp: DateTime<Utc>,
    },

    /// A booking shares its date with other live bookings
    ConflictDetected {
        booking_id: Uuid,
        user_id: String,
        event_date: NaiveDate,
        severity: String,
        conflicting: Vec<Uuid>,
        timestamp: DateTime<Utc>,
    },
}

impl GigEvent {
    /// Event name used as the SSE `event:` field
    pub fn name(&self) -> &'static str {
        match self {
            GigEvent::EnquiryIngested { .. } => "EnquiryIngested",
            GigEvent::DuplicateDelivery { .. } => "DuplicateDelivery",
            GigEvent::ExtractionDegraded { .. } => "ExtractionDegraded",
            GigEvent::BookingStatusChanged { .. } => "BookingStatusChanged",
            GigEvent::ConflictDetected { .. } => "ConflictDetected",
        }
    }
}

/// Central event distribution bus
///
/// Cheap to clone; all clones share one channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GigEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use gigflow_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<GigEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: GigEvent) -> Result<usize, broadcast::error::SendError<GigEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GigEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
