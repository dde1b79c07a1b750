use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use tracing::debug;

use storefront_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription, SubscriptionId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Default)]
struct Topic {
    events: Vec<StoredEvent>,
    bus: InMemoryEventBus<EventEnvelope<JsonValue>>,
}

/// In-memory topic store with synchronous delivery.
///
/// Intended for tests/dev and single-process deployments. Not durable.
///
/// The write lock is held across append and delivery, so every subscriber sees
/// a topic's envelopes in sequence order even under concurrent publishers.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    topics: RwLock<HashMap<String, Topic>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn publish(&self, event: UncommittedEvent) -> Result<StoredEvent, EventStoreError> {
        if event.topic.is_empty() {
            return Err(EventStoreError::InvalidPublish("empty topic".to_string()));
        }

        let mut topics = self.topics.write().map_err(|_| EventStoreError::Poisoned)?;
        let topic = topics.entry(event.topic.clone()).or_default();

        let next = topic.events.last().map(|e| e.sequence_number).unwrap_or(0) + 1;
        let stored = StoredEvent::commit(event, next);
        topic.events.push(stored.clone());

        debug!(
            topic = %stored.topic,
            sequence_number = stored.sequence_number,
            event_type = %stored.event_type,
            "event appended"
        );

        // Appended first: a failed delivery is recoverable by replay.
        topic
            .bus
            .publish(stored.to_envelope())
            .map_err(|e| EventStoreError::Delivery(e.to_string()))?;

        Ok(stored)
    }

    fn load_topic(&self, topic: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        let topics = self.topics.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(topics.get(topic).map(|t| t.events.clone()).unwrap_or_default())
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription<EventEnvelope<JsonValue>>, EventStoreError> {
        let mut topics = self.topics.write().map_err(|_| EventStoreError::Poisoned)?;
        Ok(topics.entry(topic.to_string()).or_default().bus.subscribe())
    }

    fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let Ok(topics) = self.topics.read() else {
            return false;
        };
        topics.get(topic).is_some_and(|t| t.bus.unsubscribe(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::mpsc::TryRecvError;
    use storefront_core::EntityId;
    use uuid::Uuid;

    fn event(topic: &str, event_type: &str, payload: JsonValue) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload,
        }
    }

    #[test]
    fn sequence_numbers_are_per_topic() {
        let store = InMemoryEventStore::new();
        let a1 = store.publish(event("customer", "entity_created", json!({}))).unwrap();
        let b1 = store.publish(event("order", "entity_created", json!({}))).unwrap();
        let a2 = store.publish(event("customer", "entity_updated", json!({}))).unwrap();

        assert_eq!((a1.sequence_number, a2.sequence_number), (1, 2));
        assert_eq!(b1.sequence_number, 1);
        assert_eq!(store.load_topic("customer").unwrap().len(), 2);
        assert!(store.load_topic("unknown").unwrap().is_empty());
    }

    #[test]
    fn subscribers_receive_only_their_topic() {
        let store = InMemoryEventStore::new();
        let sub = store.subscribe("customer").unwrap();

        store.publish(event("order", "entity_created", json!({}))).unwrap();
        store.publish(event("customer", "entity_created", json!({"n": 1}))).unwrap();

        let env = sub.recv().unwrap();
        assert_eq!(env.topic(), "customer");
        assert_eq!(env.sequence_number(), 1);
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let store = InMemoryEventStore::new();
        let sub = store.subscribe("customer").unwrap();

        assert!(store.unsubscribe("customer", sub.id()));
        assert!(!store.unsubscribe("customer", sub.id()));
        assert!(!store.unsubscribe("order", sub.id()));

        store.publish(event("customer", "entity_created", json!({}))).unwrap();
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn find_entity_folds_history() {
        let store = InMemoryEventStore::new();
        let id = EntityId::new();
        store
            .publish(event("customer", "entity_created", json!({"entity_id": id, "name": "A"})))
            .unwrap();
        store
            .publish(event("customer", "entity_updated", json!({"entity_id": id, "name": "B"})))
            .unwrap();
        assert_eq!(store.find_entity("customer", id).unwrap().unwrap()["name"], "B");

        store
            .publish(event("customer", "entity_deleted", json!({"entity_id": id, "name": "B"})))
            .unwrap();
        assert_eq!(store.find_entity("customer", id).unwrap(), None);
    }

    #[test]
    fn concurrent_publishers_deliver_in_sequence_order() {
        let store = Arc::new(InMemoryEventStore::new());
        let sub = store.subscribe("customer").unwrap();

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.publish(event("customer", "entity_created", json!({}))).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let seen: Vec<u64> = (0..100).map(|_| sub.recv().unwrap().sequence_number()).collect();
        assert_eq!(seen, (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn empty_topic_is_rejected() {
        let store = InMemoryEventStore::new();
        let err = store.publish(event("", "entity_created", json!({}))).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidPublish(_)));
    }
}
