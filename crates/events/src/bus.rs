//! Event publishing/subscription abstraction (mechanics only).
//!
//! This module provides the **event bus pattern**: a pub/sub mechanism for
//! distributing events to every consumer of a topic (projections, workers, ...).
//!
//! ## Delivery contract
//!
//! - **Ordered per bus**: messages published by one bus reach each subscriber in
//!   publication order. Implementations that cannot promise this must document it.
//! - **Duplicates tolerated**: consumers are expected to be idempotent. Envelopes
//!   carry a `sequence_number` so duplicates are cheap to detect.
//! - **No persistence**: the bus is for distribution, not storage (the event store
//!   is the source of truth and can be replayed).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Handle identifying one subscription, used to unsubscribe it later.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocate a process-unique subscription id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every message published after it was created
/// (broadcast semantics). Once the publisher drops its side (on unsubscribe or
/// shutdown) `recv` returns an error and consumers should exit their loop.
///
/// ## Usage Pattern
///
/// ```ignore
/// let subscription = bus.subscribe();
///
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(event) => process(event)?,
///         Err(RecvTimeoutError::Timeout) => continue,  // Check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // Unsubscribed / bus closed
///     }
/// }
/// ```
///
/// Subscriptions are designed for single-threaded consumption.
#[derive(Debug)]
pub struct Subscription<M> {
    id: SubscriptionId,
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(id: SubscriptionId, receiver: Receiver<M>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// The bus is the transport step after an event has been appended to the store:
///
/// ```text
/// Handler → Event Store (append) → Event Bus (publish) → Subscribers
///                                                          └─ Projections
/// ```
///
/// `publish()` can fail (poisoned lock, network error). Failures are surfaced to
/// the caller; the event is already stored, so consumers can recover by replay.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;

    /// Detach a subscription. Its receiver observes a disconnect once any
    /// buffered messages are drained. Returns `false` if the id was unknown.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        (**self).unsubscribe(id)
    }
}
