//! Customers domain module (event-sourced entity).
//!
//! This crate contains the customer entity, the events describing its lifecycle
//! and the typed request schema accepted by the customer service. It is pure
//! domain logic: no IO, no transport, no storage.

pub mod customer;
pub mod event;
pub mod request;

pub use customer::Customer;
pub use event::{CUSTOMER_TOPIC, CustomerEvent, CustomerEventError};
pub use request::{
    CreateCustomersRequest, CustomerDraft, CustomerLookup, CustomerQuery, NewCustomer,
    UpdateCustomerRequest, ValidatedUpdate,
};
