//! Customer request handlers.
//!
//! Each handler takes the raw request payload and returns a mapping holding
//! either `result` or `error`. Failures never escape as panics or `Err`s: the
//! caller always gets a reply.

use std::sync::Arc;

use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{debug, error};

use storefront_core::{DomainError, EntityId};
use storefront_customers::{
    CreateCustomersRequest, Customer, CustomerEvent, CustomerLookup, CustomerQuery,
    UpdateCustomerRequest,
};
use storefront_events::{EventEnvelope, Projection};
use storefront_infra::{
    CustomerDirectoryProjection, CustomerProjectionError, EventStore, EventStoreError,
    InMemoryReadModelStore, NamedHandler, Response, StoredEvent, UncommittedEvent,
};

/// The projection the service reads from.
pub type CustomerDirectory = CustomerDirectoryProjection<InMemoryReadModelStore<EntityId, Customer>>;

pub const GET_CUSTOMERS: &str = "get_customers";
pub const POST_CUSTOMERS: &str = "post_customers";
pub const PUT_CUSTOMER: &str = "put_customer";
pub const DELETE_CUSTOMER: &str = "delete_customer";

const CUSTOMER: &str = "customer";

#[derive(Debug, Error)]
enum HandlerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("event store failure: {0}")]
    Store(#[from] EventStoreError),

    #[error("failed to encode customer: {0}")]
    Encode(String),
}

/// Customer service: validates requests, reads the projection and publishes events.
///
/// Writes never touch the projection directly; it catches up through the event
/// subscription.
pub struct CustomerService {
    events: Arc<dyn EventStore>,
    projection: Arc<CustomerDirectory>,
}

impl CustomerService {
    pub fn new(events: Arc<dyn EventStore>, projection: Arc<CustomerDirectory>) -> Self {
        Self { events, projection }
    }

    /// Service over a fresh, empty in-memory directory.
    pub fn with_topic(events: Arc<dyn EventStore>, topic: impl Into<String>) -> Self {
        let projection = CustomerDirectoryProjection::with_topic(InMemoryReadModelStore::new(), topic);
        Self::new(events, Arc::new(projection))
    }

    pub fn topic(&self) -> &str {
        self.projection.topic()
    }

    pub fn events(&self) -> &Arc<dyn EventStore> {
        &self.events
    }

    pub fn projection(&self) -> &Arc<CustomerDirectory> {
        &self.projection
    }

    /// The four named handlers, ready to hand to `Receivers`.
    pub fn handlers(self: &Arc<Self>) -> Vec<NamedHandler> {
        let get = self.clone();
        let post = self.clone();
        let put = self.clone();
        let delete = self.clone();
        vec![
            NamedHandler::new(GET_CUSTOMERS, move |p| get.get_customers(p)),
            NamedHandler::new(POST_CUSTOMERS, move |p| post.post_customers(p)),
            NamedHandler::new(PUT_CUSTOMER, move |p| put.put_customer(p)),
            NamedHandler::new(DELETE_CUSTOMER, move |p| delete.delete_customer(p)),
        ]
    }

    /// No `entity_id`: every customer in the projection. With one: that customer,
    /// read from the event store.
    pub fn get_customers(&self, payload: JsonValue) -> JsonValue {
        respond(GET_CUSTOMERS, self.try_get_customers(payload))
    }

    /// Create one customer or a batch; replies with the new ids in input order.
    ///
    /// A batch stops at the first invalid entry. Entries before it stay published.
    pub fn post_customers(&self, payload: JsonValue) -> JsonValue {
        respond(POST_CUSTOMERS, self.try_post_customers(payload))
    }

    /// Replace a customer record. No existence check: last write wins.
    pub fn put_customer(&self, payload: JsonValue) -> JsonValue {
        respond(PUT_CUSTOMER, self.try_put_customer(payload))
    }

    pub fn delete_customer(&self, payload: JsonValue) -> JsonValue {
        respond(DELETE_CUSTOMER, self.try_delete_customer(payload))
    }

    /// Live subscription handler. A missed delivery is repaired from the store.
    pub fn apply_event(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), CustomerProjectionError> {
        match self.projection.apply_envelope(envelope) {
            Err(CustomerProjectionError::SequenceGap { last, found }) => {
                debug!(last, found, "sequence gap; catching up from the event store");
                self.projection.catch_up(&*self.events).map(|_| ())
            }
            other => other,
        }
    }

    fn try_get_customers(&self, payload: JsonValue) -> Result<JsonValue, HandlerError> {
        match CustomerLookup::decode(payload)?.into_query()? {
            CustomerQuery::All => encode(&self.projection.list()),
            CustomerQuery::One(entity_id) => self
                .events
                .find_entity(self.topic(), entity_id)?
                .ok_or_else(|| DomainError::not_found(CUSTOMER).into()),
        }
    }

    fn try_post_customers(&self, payload: JsonValue) -> Result<JsonValue, HandlerError> {
        let drafts = CreateCustomersRequest::decode(payload)?.into_drafts();

        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let customer = draft.validate()?.into_customer();
            let entity_id = customer.entity_id();
            self.publish(CustomerEvent::created(customer))?;
            ids.push(entity_id);
        }

        encode(&ids)
    }

    fn try_put_customer(&self, payload: JsonValue) -> Result<JsonValue, HandlerError> {
        let customer = UpdateCustomerRequest::decode(payload)?.validate()?.into_customer();
        self.publish(CustomerEvent::updated(customer))?;
        Ok(json!(true))
    }

    fn try_delete_customer(&self, payload: JsonValue) -> Result<JsonValue, HandlerError> {
        let entity_id = CustomerLookup::decode(payload)?.require_id()?;
        let customer = self
            .projection
            .get(&entity_id)
            .ok_or_else(|| DomainError::not_found(CUSTOMER))?;

        self.publish(CustomerEvent::deleted(customer))?;
        Ok(json!(true))
    }

    fn publish(&self, event: CustomerEvent) -> Result<StoredEvent, HandlerError> {
        let payload = event.payload().map_err(|e| HandlerError::Encode(e.to_string()))?;
        let stored = self
            .events
            .publish(UncommittedEvent::from_event(self.topic(), &event, payload))?;

        debug!(
            entity_id = %event.customer().entity_id(),
            action = %event.action(),
            sequence_number = stored.sequence_number,
            "customer event published"
        );
        Ok(stored)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<JsonValue, HandlerError> {
    serde_json::to_value(value).map_err(|e| HandlerError::Encode(e.to_string()))
}

fn respond(method: &str, outcome: Result<JsonValue, HandlerError>) -> JsonValue {
    match outcome {
        Ok(value) => Response::result(value),
        Err(HandlerError::Domain(e)) => {
            debug!(%method, error = %e, "request rejected");
            Response::error(e)
        }
        Err(e) => {
            error!(%method, error = %e, "request failed");
            Response::error(e)
        }
    }
}
