//! In-memory event bus for tests/dev and for the in-memory event store.

use std::sync::{Mutex, mpsc};

use crate::bus::{EventBus, Subscription, SubscriptionId};

#[derive(Debug, thiserror::Error)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("event bus lock poisoned")]
    Poisoned,
}

/// In-memory pub/sub bus.
///
/// - No IO / no async
/// - Fan-out in publication order to every live subscriber
/// - Subscribers whose receiver was dropped are pruned on the next publish
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<(SubscriptionId, mpsc::Sender<M>)>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached subscribers (including ones not yet pruned).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        // Drop any dead subscribers while publishing.
        subs.retain(|(_, tx)| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        let id = SubscriptionId::next();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages until the process restarts.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push((id, tx));
        }

        Subscription::new(id, rx)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut subs) = self.subscribers.lock() else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(sub_id, _)| *sub_id != id);
        subs.len() != before
    }
}
