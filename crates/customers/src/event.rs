use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use storefront_events::{EntityAction, Event, EventEnvelope};

use crate::Customer;

/// Topic every customer event is published to.
pub const CUSTOMER_TOPIC: &str = "customer";

/// A lifecycle fact about one customer.
///
/// Every variant carries the full customer record: created/updated events hold
/// the new state, deleted events hold the state that was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerEvent {
    action: EntityAction,
    customer: Customer,
    occurred_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CustomerEventError {
    #[error("not a customer lifecycle event: {0}")]
    UnknownAction(String),

    #[error("failed to deserialize customer payload: {0}")]
    Payload(String),
}

impl CustomerEvent {
    pub fn new(action: EntityAction, customer: Customer, occurred_at: DateTime<Utc>) -> Self {
        Self {
            action,
            customer,
            occurred_at,
        }
    }

    pub fn created(customer: Customer) -> Self {
        Self::new(EntityAction::Created, customer, Utc::now())
    }

    pub fn updated(customer: Customer) -> Self {
        Self::new(EntityAction::Updated, customer, Utc::now())
    }

    pub fn deleted(customer: Customer) -> Self {
        Self::new(EntityAction::Deleted, customer, Utc::now())
    }

    pub fn action(&self) -> EntityAction {
        self.action
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn into_customer(self) -> Customer {
        self.customer
    }

    /// JSON payload stored alongside the event type.
    pub fn payload(&self) -> Result<JsonValue, CustomerEventError> {
        serde_json::to_value(&self.customer).map_err(|e| CustomerEventError::Payload(e.to_string()))
    }

    /// Decode a delivered envelope back into a typed event.
    pub fn from_envelope(envelope: &EventEnvelope<JsonValue>) -> Result<Self, CustomerEventError> {
        let action = EntityAction::parse(envelope.event_type())
            .ok_or_else(|| CustomerEventError::UnknownAction(envelope.event_type().to_string()))?;
        let customer: Customer = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| CustomerEventError::Payload(e.to_string()))?;
        Ok(Self::new(action, customer, envelope.occurred_at()))
    }
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        self.action.as_str()
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(event_type: &str, payload: JsonValue) -> EventEnvelope<JsonValue> {
        // Nil event id: decoding never looks at it.
        EventEnvelope::new(Default::default(), CUSTOMER_TOPIC, 1, event_type, Utc::now(), payload)
    }

    #[test]
    fn event_type_follows_action() {
        let c = Customer::create("Alice", "a@x.com");
        assert_eq!(CustomerEvent::created(c.clone()).event_type(), "entity_created");
        assert_eq!(CustomerEvent::updated(c.clone()).event_type(), "entity_updated");
        assert_eq!(CustomerEvent::deleted(c).event_type(), "entity_deleted");
    }

    #[test]
    fn decodes_from_envelope() {
        let c = Customer::create("Alice", "a@x.com");
        let ev = CustomerEvent::updated(c.clone());
        let env = envelope(ev.event_type(), ev.payload().unwrap());

        let decoded = CustomerEvent::from_envelope(&env).unwrap();
        assert_eq!(decoded.action(), EntityAction::Updated);
        assert_eq!(decoded.customer(), &c);
    }

    #[test]
    fn rejects_foreign_event_types_and_bad_payloads() {
        let env = envelope("order_created", serde_json::json!({}));
        assert!(matches!(
            CustomerEvent::from_envelope(&env),
            Err(CustomerEventError::UnknownAction(t)) if t == "order_created"
        ));

        let env = envelope("entity_created", serde_json::json!({ "name": "no id" }));
        assert!(matches!(
            CustomerEvent::from_envelope(&env),
            Err(CustomerEventError::Payload(_))
        ));
    }
}
