use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope for an event, containing topic + stream metadata.
///
/// This is the unit delivered to subscribers of a topic.
///
/// Notes:
/// - **Topic-scoped**: every envelope belongs to exactly one named topic.
/// - **Append-only**: `sequence_number` is monotonically increasing per topic,
///   starting at 1.
/// - `payload` is the domain-agnostic event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    topic: String,

    /// Monotonically increasing position in the topic stream.
    sequence_number: u64,

    event_type: String,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        topic: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            topic: topic.into(),
            sequence_number,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
