//! Event primitives: the event trait, entity lifecycle actions, envelopes,
//! pub/sub mechanics and the projection contract.
//!
//! Nothing here performs IO; storage and transport live in `storefront-infra`.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;

pub use bus::{EventBus, Subscription, SubscriptionId};
pub use envelope::EventEnvelope;
pub use event::{EntityAction, Event, UnknownAction};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
