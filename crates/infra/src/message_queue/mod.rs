//! Request/response messaging between services.
//!
//! A service binds an inbox under its name; clients send named calls
//! (`method` + JSON payload) to that name and block for the reply. Every reply
//! is a JSON object holding either `result` or `error`.

pub mod in_memory;
pub mod receivers;

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use serde_json::{Value as JsonValue, json};
use thiserror::Error;

pub use in_memory::InMemoryMessageQueue;
pub use receivers::{NamedHandler, Receivers};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("no service bound under '{0}'")]
    ServiceUnavailable(String),

    #[error("a service is already bound under '{0}'")]
    AlreadyBound(String),

    #[error("timed out after {0:?} waiting for a reply")]
    Timeout(Duration),

    #[error("service '{0}' went away before replying")]
    Disconnected(String),

    #[error("message queue lock poisoned")]
    Poisoned,
}

/// One inbound call, carrying the channel its reply goes back on.
#[derive(Debug)]
pub struct Request {
    method: String,
    payload: JsonValue,
    reply: mpsc::Sender<JsonValue>,
}

impl Request {
    pub fn new(method: impl Into<String>, payload: JsonValue, reply: mpsc::Sender<JsonValue>) -> Self {
        Self {
            method: method.into(),
            payload,
            reply,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    /// Send the reply. Returns `false` if the caller stopped waiting.
    pub fn respond(self, response: JsonValue) -> bool {
        self.reply.send(response).is_ok()
    }

    pub fn into_parts(self) -> (String, JsonValue, mpsc::Sender<JsonValue>) {
        (self.method, self.payload, self.reply)
    }
}

/// Receiving side of a bound service.
#[derive(Debug)]
pub struct Inbox {
    service: String,
    receiver: mpsc::Receiver<Request>,
}

impl Inbox {
    pub fn new(service: impl Into<String>, receiver: mpsc::Receiver<Request>) -> Self {
        Self {
            service: service.into(),
            receiver,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Request, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Service-addressed request/response transport.
pub trait MessageQueue: Send + Sync {
    /// Claim `service` and start receiving its calls.
    fn bind(&self, service: &str) -> Result<Inbox, QueueError>;

    /// Release `service`. Returns `false` if nothing was bound.
    fn unbind(&self, service: &str) -> bool;

    /// Call `method` on `service` and block for the reply.
    fn send(&self, service: &str, method: &str, payload: JsonValue) -> Result<JsonValue, QueueError>;
}

impl<Q> MessageQueue for Arc<Q>
where
    Q: MessageQueue + ?Sized,
{
    fn bind(&self, service: &str) -> Result<Inbox, QueueError> {
        (**self).bind(service)
    }

    fn unbind(&self, service: &str) -> bool {
        (**self).unbind(service)
    }

    fn send(&self, service: &str, method: &str, payload: JsonValue) -> Result<JsonValue, QueueError> {
        (**self).send(service, method, payload)
    }
}

/// Client call used by other services: `send_message(queue, "customer-service", "get_customers", json!({}))`.
pub fn send_message<Q>(
    queue: &Q,
    service: &str,
    method: &str,
    payload: JsonValue,
) -> Result<JsonValue, QueueError>
where
    Q: MessageQueue + ?Sized,
{
    queue.send(service, method, payload)
}

/// Reply constructors.
pub struct Response;

impl Response {
    pub fn result(value: JsonValue) -> JsonValue {
        json!({ "result": value })
    }

    pub fn error(message: impl std::fmt::Display) -> JsonValue {
        json!({ "error": message.to_string() })
    }
}
