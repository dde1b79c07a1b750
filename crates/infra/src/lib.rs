//! Infrastructure layer: event storage, read models, projections, messaging and workers.

pub mod event_store;
pub mod message_queue;
pub mod projections;
pub mod read_model;
pub mod workers;

pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use message_queue::{
    Inbox, InMemoryMessageQueue, MessageQueue, NamedHandler, QueueError, Receivers, Request,
    Response, send_message,
};
pub use projections::{CustomerDirectoryProjection, CustomerProjectionError};
pub use read_model::{InMemoryReadModelStore, ReadModelStore};
pub use workers::{ProjectionWorker, WorkerHandle};
