//! Event model for the queue store

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Application-specific event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPayload {
    pub number: i64,
}

/// An event as stored in the queue.
///
/// Immutable once written: created by [`enqueue`], removed by a committed
/// consume transaction, never updated in place. `sequence_id` is assigned at
/// insertion, strictly increasing across all enqueues and never reused, even
/// after deletion.
///
/// [`enqueue`]: crate::store::traits::EventStore::enqueue
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    /// Store-assigned position in the global enqueue order.
    pub sequence_id: i64,
    /// External identity of the event itself.
    pub event_id: Uuid,
    /// Identity of the application instance that produced the event.
    pub application_id: Uuid,
    /// When the producer created the event.
    pub created_at: DateTime<Utc>,
    /// When the store durably wrote the event.
    pub inserted_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {} (#{})", self.event_id, self.sequence_id)
    }
}

/// What a producer submits; the store assigns `sequence_id` and
/// `inserted_at` on acceptance.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub event_id: Uuid,
    pub application_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl EnqueueRequest {
    pub fn new(application_id: Uuid, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            application_id,
            created_at: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_request_carries_fresh_identity() {
        let application_id = Uuid::new_v4();
        let a = EnqueueRequest::new(application_id, EventPayload { number: 1 });
        let b = EnqueueRequest::new(application_id, EventPayload { number: 2 });

        assert_ne!(a.event_id, b.event_id);
        assert_eq!(a.application_id, b.application_id);
    }

    #[test]
    fn test_event_display_names_id_and_sequence() {
        let event = InputEvent {
            sequence_id: 7,
            event_id: Uuid::nil(),
            application_id: Uuid::nil(),
            created_at: Utc::now(),
            inserted_at: Utc::now(),
            payload: EventPayload { number: 3 },
        };

        let rendered = event.to_string();
        assert!(rendered.contains("#7"));
        assert!(rendered.contains(&Uuid::nil().to_string()));
    }
}
