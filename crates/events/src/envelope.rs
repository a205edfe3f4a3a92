use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Event;

/// Envelope for a delivered event.
///
/// Notes:
/// - `event_id` is stable across redeliveries of the same event.
/// - `attempt` counts deliveries (1 for the first one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    attempt: u32,
    delivered_at: DateTime<Utc>,
    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    pub fn new(payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: payload.event_type().to_string(),
            attempt: 1,
            delivered_at: Utc::now(),
            payload,
        }
    }
}

impl<E: Clone> EventEnvelope<E> {
    /// A second delivery of the same event.
    pub fn redelivery(&self) -> Self {
        Self {
            event_id: self.event_id,
            event_type: self.event_type.clone(),
            attempt: self.attempt + 1,
            delivered_at: Utc::now(),
            payload: self.payload.clone(),
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn delivered_at(&self) -> DateTime<Utc> {
        self.delivered_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
