//! Redis Streams-backed event store.
//!
//! - **Stream per topic**: `<prefix>:<topic>` holds the append-only history
//! - **Sequence counter**: `<prefix>:<topic>:seq`, incremented in the same Lua
//!   script that appends, so numbering and stream order always agree
//! - **Live delivery**: each subscription runs a polling thread issuing blocking
//!   `XREAD`s from the stream tail observed at subscribe time

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use redis::Commands;
use redis::streams::{StreamId, StreamRangeReply, StreamReadOptions, StreamReadReply};
use serde_json::Value as JsonValue;
use tracing::{debug, error, instrument};

use storefront_events::{EventEnvelope, Subscription, SubscriptionId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

const DEFAULT_KEY_PREFIX: &str = "storefront:events";

/// Blocking window of one `XREAD`; bounds how long unsubscribe takes to land.
const READ_BLOCK_MS: usize = 250;
const READ_BATCH: usize = 64;

const APPEND_SCRIPT: &str = r#"
local seq = redis.call('INCR', KEYS[2])
redis.call('XADD', KEYS[1], '*', 'sequence_number', seq, 'event', ARGV[1])
return seq
"#;

#[derive(Debug, thiserror::Error)]
pub enum RedisEventStoreError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Malformed stream entry {id}: {reason}")]
    Malformed { id: String, reason: String },
}

impl From<RedisEventStoreError> for EventStoreError {
    fn from(err: RedisEventStoreError) -> Self {
        EventStoreError::Backend(err.to_string())
    }
}

#[derive(Debug)]
struct LiveSubscription {
    topic: String,
    stop: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct RedisEventStore {
    client: Arc<redis::Client>,
    key_prefix: String,
    subscriptions: Mutex<HashMap<SubscriptionId, LiveSubscription>>,
}

impl RedisEventStore {
    /// Create a store using `redis_url` (e.g. "redis://localhost:6379").
    ///
    /// No connection is made until the first command.
    pub fn new(redis_url: impl AsRef<str>, key_prefix: Option<String>) -> Result<Self, RedisEventStoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisEventStoreError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            key_prefix: key_prefix.unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    fn stream_key(&self, topic: &str) -> String {
        format!("{}:{}", self.key_prefix, topic)
    }

    fn counter_key(&self, topic: &str) -> String {
        format!("{}:{}:seq", self.key_prefix, topic)
    }

    fn connection(&self) -> Result<redis::Connection, RedisEventStoreError> {
        self.client
            .get_connection()
            .map_err(|e| RedisEventStoreError::Connection(e.to_string()))
    }

    /// Id of the newest entry, or `0-0` for an empty stream.
    fn tail_id(&self, conn: &mut redis::Connection, stream_key: &str) -> Result<String, RedisEventStoreError> {
        let reply: StreamRangeReply = conn
            .xrevrange_count(stream_key, "+", "-", 1)
            .map_err(|e| RedisEventStoreError::Command(format!("XREVRANGE failed: {e}")))?;
        Ok(reply
            .ids
            .into_iter()
            .next()
            .map(|entry| entry.id)
            .unwrap_or_else(|| "0-0".to_string()))
    }
}

fn parse_entry(entry: &StreamId) -> Result<StoredEvent, RedisEventStoreError> {
    let malformed = |reason: &str| RedisEventStoreError::Malformed {
        id: entry.id.clone(),
        reason: reason.to_string(),
    };

    let sequence_number: u64 = entry
        .get("sequence_number")
        .ok_or_else(|| malformed("missing sequence_number"))?;
    let raw: String = entry.get("event").ok_or_else(|| malformed("missing event"))?;
    let event: UncommittedEvent =
        serde_json::from_str(&raw).map_err(|e| malformed(&e.to_string()))?;

    Ok(StoredEvent::commit(event, sequence_number))
}

impl EventStore for RedisEventStore {
    #[instrument(skip(self, event), fields(topic = %event.topic, event_type = %event.event_type), err)]
    fn publish(&self, event: UncommittedEvent) -> Result<StoredEvent, EventStoreError> {
        if event.topic.is_empty() {
            return Err(EventStoreError::InvalidPublish("empty topic".to_string()));
        }

        let body = serde_json::to_string(&event)
            .map_err(|e| EventStoreError::InvalidPublish(format!("payload serialization failed: {e}")))?;

        let mut conn = self.connection()?;
        let sequence_number: u64 = redis::Script::new(APPEND_SCRIPT)
            .key(self.stream_key(&event.topic))
            .key(self.counter_key(&event.topic))
            .arg(body)
            .invoke(&mut conn)
            .map_err(|e| RedisEventStoreError::Command(format!("append script failed: {e}")))?;

        debug!(sequence_number, "event appended");
        Ok(StoredEvent::commit(event, sequence_number))
    }

    fn load_topic(&self, topic: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut conn = self.connection()?;
        let reply: StreamRangeReply = conn
            .xrange_all(self.stream_key(topic))
            .map_err(|e| RedisEventStoreError::Command(format!("XRANGE failed: {e}")))?;

        let mut events = reply
            .ids
            .iter()
            .map(parse_entry)
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by_key(|e| e.sequence_number);
        Ok(events)
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription<EventEnvelope<JsonValue>>, EventStoreError> {
        let stream_key = self.stream_key(topic);
        let mut conn = self.connection()?;
        let mut last_id = self.tail_id(&mut conn, &stream_key)?;

        let id = SubscriptionId::next();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let thread_stop = stop.clone();
        thread::Builder::new()
            .name(format!("redis-sub-{}", id.as_u64()))
            .spawn(move || {
                let options = StreamReadOptions::default()
                    .block(READ_BLOCK_MS)
                    .count(READ_BATCH);

                while !thread_stop.load(Ordering::Acquire) {
                    let reply: Option<StreamReadReply> =
                        match conn.xread_options(&[&stream_key], &[&last_id], &options) {
                            Ok(reply) => reply,
                            Err(e) => {
                                error!(stream = %stream_key, error = %e, "XREAD failed; closing subscription");
                                return;
                            }
                        };

                    let entries = reply.into_iter().flat_map(|r| r.keys).flat_map(|k| k.ids);
                    for entry in entries {
                        last_id = entry.id.clone();
                        match parse_entry(&entry) {
                            Ok(stored) => {
                                if tx.send(stored.to_envelope()).is_err() {
                                    return;
                                }
                            }
                            Err(e) => error!(error = %e, "skipping malformed stream entry"),
                        }
                    }
                }
            })
            .map_err(|e| EventStoreError::Backend(format!("failed to spawn subscription thread: {e}")))?;

        self.subscriptions
            .lock()
            .map_err(|_| EventStoreError::Poisoned)?
            .insert(
                id,
                LiveSubscription {
                    topic: topic.to_string(),
                    stop,
                },
            );

        Ok(Subscription::new(id, rx))
    }

    fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> bool {
        let Ok(mut subs) = self.subscriptions.lock() else {
            return false;
        };
        match subs.get(&id) {
            Some(live) if live.topic == topic => {}
            _ => return false,
        }
        subs.remove(&id)
            .map(|live| live.stop.store(true, Ordering::Release))
            .is_some()
    }
}

impl Drop for RedisEventStore {
    fn drop(&mut self) {
        if let Ok(subs) = self.subscriptions.get_mut() {
            for live in subs.values() {
                live.stop.store(true, Ordering::Release);
            }
        }
    }
}
