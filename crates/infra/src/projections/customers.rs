use std::sync::Mutex;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use storefront_core::{Entity, EntityId};
use storefront_customers::{CUSTOMER_TOPIC, Customer, CustomerEvent, CustomerEventError};
use storefront_events::{EntityAction, EventEnvelope, Projection};

use crate::event_store::EventStore;
use crate::read_model::ReadModelStore;

#[derive(Debug, Error)]
pub enum CustomerProjectionError {
    #[error("failed to decode customer event at sequence {sequence_number}: {reason}")]
    Decode { sequence_number: u64, reason: String },

    #[error("invalid sequence number {0} (topics start at 1)")]
    InvalidSequence(u64),

    #[error("sequence gap (last={last}, found={found})")]
    SequenceGap { last: u64, found: u64 },

    #[error("failed to load history: {0}")]
    Store(String),

    #[error("projection cursor lock poisoned")]
    Poisoned,
}

/// Customer directory projection.
///
/// Maintains `entity_id → latest Customer` from the customer topic.
///
/// Correct only if envelopes of the topic are delivered in sequence order,
/// which every `EventStore` promises. On top of that it is:
/// - **Idempotent**: envelopes at or below the cursor are skipped
/// - **Gap-aware**: a jump past `cursor + 1` is reported instead of applied,
///   and `catch_up` fills the hole from the store
/// - **Serialized**: the cursor lock is held for the whole apply, so the live
///   subscriber and a replay never interleave
#[derive(Debug)]
pub struct CustomerDirectoryProjection<S>
where
    S: ReadModelStore<EntityId, Customer>,
{
    store: S,
    topic: String,
    cursor: Mutex<u64>,
}

impl<S> CustomerDirectoryProjection<S>
where
    S: ReadModelStore<EntityId, Customer>,
{
    pub fn new(store: S) -> Self {
        Self::with_topic(store, CUSTOMER_TOPIC)
    }

    pub fn with_topic(store: S, topic: impl Into<String>) -> Self {
        Self {
            store,
            topic: topic.into(),
            cursor: Mutex::new(0),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<Customer> {
        self.store.get(entity_id)
    }

    /// All customers, sorted by name then id.
    pub fn list(&self) -> Vec<Customer> {
        let mut all = self.store.list();
        all.sort_by(|a, b| {
            a.name()
                .cmp(b.name())
                .then_with(|| a.id().cmp(b.id()))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Apply every stored event newer than the cursor. Returns how many were applied.
    ///
    /// Undecodable events are logged and skipped; they still consume their position.
    pub fn catch_up<E>(&self, events: &E) -> Result<usize, CustomerProjectionError>
    where
        E: EventStore + ?Sized,
    {
        let history = events
            .load_topic(&self.topic)
            .map_err(|e| CustomerProjectionError::Store(e.to_string()))?;

        let mut cursor = self.cursor.lock().map_err(|_| CustomerProjectionError::Poisoned)?;
        let mut applied = 0;
        for stored in &history {
            if stored.sequence_number <= *cursor {
                continue;
            }
            if self.replay_one(&mut cursor, &stored.to_envelope())? {
                applied += 1;
            }
        }

        if applied > 0 {
            debug!(topic = %self.topic, applied, cursor = *cursor, "projection caught up");
        }
        Ok(applied)
    }

    /// Replay step shared by `catch_up` and `rebuild_from_scratch`.
    /// Returns `false` when the envelope was skipped as undecodable.
    fn replay_one(
        &self,
        cursor: &mut u64,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<bool, CustomerProjectionError> {
        match self.apply_locked(cursor, envelope) {
            Ok(()) => Ok(true),
            Err(CustomerProjectionError::Decode { sequence_number, reason }) => {
                warn!(topic = %self.topic, sequence_number, %reason, "skipping undecodable customer event");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn apply_locked(
        &self,
        cursor: &mut u64,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CustomerProjectionError> {
        let seq = envelope.sequence_number();

        if seq == 0 {
            return Err(CustomerProjectionError::InvalidSequence(seq));
        }

        if seq <= *cursor {
            // Duplicate or replay.
            return Ok(());
        }

        if seq != *cursor + 1 {
            return Err(CustomerProjectionError::SequenceGap {
                last: *cursor,
                found: seq,
            });
        }

        // The position is consumed even if the payload is unusable; otherwise every
        // later envelope would look like a gap.
        *cursor = seq;

        let event = match CustomerEvent::from_envelope(envelope) {
            Ok(event) => event,
            Err(CustomerEventError::UnknownAction(event_type)) => {
                debug!(%event_type, sequence_number = seq, "ignoring non-lifecycle event");
                return Ok(());
            }
            Err(e) => {
                return Err(CustomerProjectionError::Decode {
                    sequence_number: seq,
                    reason: e.to_string(),
                });
            }
        };

        let action = event.action();
        let customer = event.into_customer();
        let entity_id = *customer.id();
        match action {
            EntityAction::Created | EntityAction::Updated => self.store.upsert(entity_id, customer),
            EntityAction::Deleted => {
                self.store.remove(&entity_id);
            }
        }

        debug!(%entity_id, %action, sequence_number = seq, "customer event applied");
        Ok(())
    }
}

impl<S> Projection for CustomerDirectoryProjection<S>
where
    S: ReadModelStore<EntityId, Customer>,
{
    type Error = CustomerProjectionError;

    /// Envelopes for other topics are ignored (allows sharing a subscription).
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
        if envelope.topic() != self.topic {
            return Ok(());
        }

        let mut cursor = self.cursor.lock().map_err(|_| CustomerProjectionError::Poisoned)?;
        self.apply_locked(&mut cursor, envelope)
    }

    fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), Self::Error> {
        let mut envs: Vec<_> = envelopes
            .into_iter()
            .filter(|e| e.topic() == self.topic)
            .collect();
        envs.sort_by_key(|e| e.sequence_number());

        let mut cursor = self.cursor.lock().map_err(|_| CustomerProjectionError::Poisoned)?;
        self.store.clear();
        *cursor = 0;

        for env in &envs {
            self.replay_one(&mut cursor, env)?;
        }

        Ok(())
    }

    fn cursor(&self) -> u64 {
        self.cursor.lock().map(|c| *c).unwrap_or(0)
    }
}
