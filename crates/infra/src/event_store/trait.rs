use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use std::sync::Arc;
use storefront_core::EntityId;
use storefront_events::{EntityAction, Event, EventEnvelope, Subscription, SubscriptionId};

/// An event ready to be published to a topic (not yet assigned a sequence number).
///
/// ## Event Lifecycle
///
/// 1. **Domain event**: built by a request handler (e.g. `CustomerEvent::created`)
/// 2. **UncommittedEvent**: serialized payload plus topic and event metadata
/// 3. **StoredEvent**: appended to the topic with an assigned `sequence_number`
/// 4. **EventEnvelope**: delivered to every subscriber of the topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub topic: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl UncommittedEvent {
    /// Wrap a typed domain event whose payload has already been serialized.
    ///
    /// Metadata (type, version, timestamp) is taken from the event itself and a
    /// fresh time-ordered event id is assigned.
    pub fn from_event<E>(topic: impl Into<String>, event: &E, payload: JsonValue) -> Self
    where
        E: Event,
    {
        Self {
            event_id: Uuid::now_v7(),
            topic: topic.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        }
    }
}

/// An event appended to a topic stream.
///
/// Sequence numbers are assigned by the store on publish and are:
/// - **Topic-scoped**: every topic counts from 1
/// - **Gapless**: each event gets `last + 1`
/// - **Immutable**: once assigned they never change
///
/// Subscribers use them to skip duplicates and to detect missed deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub topic: String,

    /// Monotonically increasing position in the topic stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub(crate) fn commit(event: UncommittedEvent, sequence_number: u64) -> Self {
        Self {
            event_id: event.event_id,
            topic: event.topic,
            sequence_number,
            event_type: event.event_type,
            event_version: event.event_version,
            occurred_at: event.occurred_at,
            payload: event.payload,
        }
    }

    /// Convert a stored event into an envelope for delivery.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.topic.clone(),
            self.sequence_number,
            self.event_type.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
    }

    /// Entity id carried in the payload, if any.
    pub fn entity_id(&self) -> Option<EntityId> {
        self.payload
            .get("entity_id")
            .and_then(JsonValue::as_str)
            .and_then(|s| s.parse().ok())
    }
}

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, transport) as opposed to
/// domain errors (validation, not found).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("invalid publish: {0}")]
    InvalidPublish(String),

    #[error("event store backend failure: {0}")]
    Backend(String),

    #[error("event store lock poisoned")]
    Poisoned,

    #[error("event delivery failed: {0}")]
    Delivery(String),
}

/// Append-only, topic-scoped event store with live delivery.
///
/// Events are organized into one stream per **topic**. Within a topic, events
/// carry gapless sequence numbers (1, 2, 3, ...).
///
/// ## Publish Semantics
///
/// `publish()` appends the event and then hands its envelope to every current
/// subscriber of the topic. Delivery happens in append order per topic; a
/// subscriber may observe duplicates (at-least-once) but never a reordering.
///
/// ## Read Semantics
///
/// - `load_topic()` returns the full history of a topic in sequence order (empty
///   if nothing was published yet).
/// - `find_entity()` folds the topic history for one entity and returns its
///   latest payload, or `None` if it was never created or has been deleted.
pub trait EventStore: Send + Sync {
    fn publish(&self, event: UncommittedEvent) -> Result<StoredEvent, EventStoreError>;

    fn load_topic(&self, topic: &str) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn find_entity(
        &self,
        topic: &str,
        entity_id: EntityId,
    ) -> Result<Option<JsonValue>, EventStoreError> {
        let history = self.load_topic(topic)?;
        Ok(fold_entity(&history, entity_id))
    }

    /// Receive every event published to `topic` from now on.
    fn subscribe(&self, topic: &str) -> Result<Subscription<EventEnvelope<JsonValue>>, EventStoreError>;

    /// Stop delivery to a subscription. Returns `false` if it was not attached.
    fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn publish(&self, event: UncommittedEvent) -> Result<StoredEvent, EventStoreError> {
        (**self).publish(event)
    }

    fn load_topic(&self, topic: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_topic(topic)
    }

    fn find_entity(
        &self,
        topic: &str,
        entity_id: EntityId,
    ) -> Result<Option<JsonValue>, EventStoreError> {
        (**self).find_entity(topic, entity_id)
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription<EventEnvelope<JsonValue>>, EventStoreError> {
        (**self).subscribe(topic)
    }

    fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        (**self).unsubscribe(topic, id)
    }
}

/// Latest payload of one entity within an ordered topic history.
///
/// Events whose type is not an entity lifecycle action are ignored.
pub fn fold_entity(history: &[StoredEvent], entity_id: EntityId) -> Option<JsonValue> {
    history
        .iter()
        .filter(|e| e.entity_id() == Some(entity_id))
        .fold(None, |state, e| match EntityAction::parse(&e.event_type) {
            Some(EntityAction::Created | EntityAction::Updated) => Some(e.payload.clone()),
            Some(EntityAction::Deleted) => None,
            None => state,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(seq: u64, event_type: &str, payload: JsonValue) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::now_v7(),
            topic: "customer".to_string(),
            sequence_number: seq,
            event_type: event_type.to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload,
        }
    }

    #[test]
    fn fold_tracks_latest_state_per_entity() {
        let a = EntityId::new();
        let b = EntityId::new();
        let history = vec![
            stored(1, "entity_created", json!({"entity_id": a, "name": "Alice"})),
            stored(2, "entity_created", json!({"entity_id": b, "name": "Bob"})),
            stored(3, "entity_updated", json!({"entity_id": a, "name": "Alicia"})),
            stored(4, "entity_deleted", json!({"entity_id": b, "name": "Bob"})),
        ];

        assert_eq!(fold_entity(&history, a).unwrap()["name"], "Alicia");
        assert_eq!(fold_entity(&history, b), None);
        assert_eq!(fold_entity(&history, EntityId::new()), None);
    }

    #[test]
    fn envelope_keeps_stream_metadata() {
        let e = stored(7, "entity_created", json!({}));
        let env = e.to_envelope();
        assert_eq!(env.sequence_number(), 7);
        assert_eq!(env.topic(), "customer");
        assert_eq!(env.event_type(), "entity_created");
        assert_eq!(env.event_id(), e.event_id);
    }
}
