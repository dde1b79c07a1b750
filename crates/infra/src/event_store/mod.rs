//! Topic-scoped event store boundary.
//!
//! This module defines the infrastructure-facing abstraction for publishing,
//! loading and subscribing to event topics, plus its implementations.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "redis")]
pub use self::redis::{RedisEventStore, RedisEventStoreError};
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, fold_entity};
