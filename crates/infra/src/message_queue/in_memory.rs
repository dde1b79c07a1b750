use std::collections::HashMap;
use std::sync::{RwLock, mpsc};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::debug;

use super::{Inbox, MessageQueue, QueueError, Request};

/// Default time a caller waits for a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// In-process message queue.
///
/// - One inbox per service name
/// - Calls are queued in arrival order and answered over a per-call channel
/// - Unbinding drops the inbox sender; the receiving loop sees a disconnect
#[derive(Debug)]
pub struct InMemoryMessageQueue {
    services: RwLock<HashMap<String, mpsc::Sender<Request>>>,
    reply_timeout: Duration,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REPLY_TIMEOUT)
    }

    pub fn with_timeout(reply_timeout: Duration) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            reply_timeout,
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub fn is_bound(&self, service: &str) -> bool {
        self.services
            .read()
            .map(|s| s.contains_key(service))
            .unwrap_or(false)
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue for InMemoryMessageQueue {
    fn bind(&self, service: &str) -> Result<Inbox, QueueError> {
        let mut services = self.services.write().map_err(|_| QueueError::Poisoned)?;
        if services.contains_key(service) {
            return Err(QueueError::AlreadyBound(service.to_string()));
        }

        let (tx, rx) = mpsc::channel();
        services.insert(service.to_string(), tx);
        debug!(service, "service bound");
        Ok(Inbox::new(service, rx))
    }

    fn unbind(&self, service: &str) -> bool {
        let Ok(mut services) = self.services.write() else {
            return false;
        };
        services.remove(service).is_some()
    }

    fn send(&self, service: &str, method: &str, payload: JsonValue) -> Result<JsonValue, QueueError> {
        let inbox = {
            let services = self.services.read().map_err(|_| QueueError::Poisoned)?;
            services
                .get(service)
                .cloned()
                .ok_or_else(|| QueueError::ServiceUnavailable(service.to_string()))?
        };

        let (reply_tx, reply_rx) = mpsc::channel();
        inbox
            .send(Request::new(method, payload, reply_tx))
            .map_err(|_| QueueError::Disconnected(service.to_string()))?;

        reply_rx.recv_timeout(self.reply_timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => QueueError::Timeout(self.reply_timeout),
            RecvTimeoutError::Disconnected => QueueError::Disconnected(service.to_string()),
        })
    }
}
