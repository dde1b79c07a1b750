//! Typed request schema for the customer service.
//!
//! Inbound requests arrive as loose JSON. Each operation first decodes the body
//! into one of the types below and then validates it into a value the handler
//! can act on. Nothing is published unless validation succeeded.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use storefront_core::{DomainError, DomainResult, EntityId};

use crate::Customer;

const NAME_AND_EMAIL: &str = "'name' and/or 'email'";
const ENTITY_ID: &str = "'entity_id'";
const CUSTOMER: &str = "customer";

/// Decode a request body. A `null` body is treated as an empty object so that
/// "no parameters" and "`{}`" behave the same.
fn decode<T: DeserializeOwned>(payload: JsonValue) -> DomainResult<T> {
    let payload = match payload {
        JsonValue::Null => JsonValue::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(payload).map_err(|e| DomainError::invalid_request(e.to_string()))
}

/// Blank strings count as absent.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Name + email as supplied by a caller, not yet validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CustomerDraft {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Validated customer attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
}

impl CustomerDraft {
    pub fn validate(self) -> DomainResult<NewCustomer> {
        match (present(self.name), present(self.email)) {
            (Some(name), Some(email)) => Ok(NewCustomer { name, email }),
            _ => Err(DomainError::missing(NAME_AND_EMAIL)),
        }
    }
}

impl NewCustomer {
    /// Run the entity factory.
    pub fn into_customer(self) -> Customer {
        Customer::create(self.name, self.email)
    }
}

/// Body of `post_customers`: a single draft or a batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CreateCustomersRequest {
    Batch(Vec<CustomerDraft>),
    Single(CustomerDraft),
}

impl CreateCustomersRequest {
    pub fn decode(payload: JsonValue) -> DomainResult<Self> {
        decode(payload)
    }

    pub fn into_drafts(self) -> Vec<CustomerDraft> {
        match self {
            CreateCustomersRequest::Batch(drafts) => drafts,
            CreateCustomersRequest::Single(draft) => vec![draft],
        }
    }
}

/// Body of `put_customer`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateCustomerRequest {
    pub entity_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A complete replacement record for an existing (or assumed) entity id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpdate {
    pub entity_id: EntityId,
    pub details: NewCustomer,
}

impl ValidatedUpdate {
    pub fn into_customer(self) -> Customer {
        Customer::with_id(self.entity_id, self.details.name, self.details.email)
    }
}

impl UpdateCustomerRequest {
    pub fn decode(payload: JsonValue) -> DomainResult<Self> {
        decode(payload)
    }

    /// Attributes are checked before the identifier, so a request missing both
    /// reports the attributes.
    pub fn validate(self) -> DomainResult<ValidatedUpdate> {
        let details = CustomerDraft {
            name: self.name,
            email: self.email,
        }
        .validate()?;

        let raw = present(self.entity_id).ok_or_else(|| DomainError::missing(ENTITY_ID))?;
        let entity_id: EntityId = raw.trim().parse()?;

        Ok(ValidatedUpdate { entity_id, details })
    }
}

/// Body of `get_customers` and `delete_customer`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CustomerLookup {
    pub entity_id: Option<String>,
}

/// What `get_customers` should return.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CustomerQuery {
    All,
    One(EntityId),
}

impl CustomerLookup {
    pub fn decode(payload: JsonValue) -> DomainResult<Self> {
        decode(payload)
    }

    /// No id → list everything. An id that cannot name any entity is reported
    /// as not found, same as a well-formed id nobody created.
    pub fn into_query(self) -> DomainResult<CustomerQuery> {
        match present(self.entity_id) {
            None => Ok(CustomerQuery::All),
            Some(raw) => raw
                .trim()
                .parse()
                .map(CustomerQuery::One)
                .map_err(|_| DomainError::not_found(CUSTOMER)),
        }
    }

    /// The id is mandatory (delete).
    pub fn require_id(self) -> DomainResult<EntityId> {
        let raw = present(self.entity_id).ok_or_else(|| DomainError::missing(ENTITY_ID))?;
        raw.trim().parse().map_err(|_| DomainError::not_found(CUSTOMER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn single_and_batch_bodies_both_decode() {
        let single = CreateCustomersRequest::decode(json!({"name": "Alice", "email": "a@x.com"}))
            .unwrap()
            .into_drafts();
        assert_eq!(single.len(), 1);

        let batch = CreateCustomersRequest::decode(json!([
            {"name": "Alice", "email": "a@x.com"},
            {"name": "Bob", "email": "b@x.com"},
        ]))
        .unwrap()
        .into_drafts();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].name.as_deref(), Some("Bob"));
    }

    #[test]
    fn missing_email_is_a_missing_parameter() {
        let err = CustomerDraft {
            name: Some("Alice".into()),
            email: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing mandatory parameter 'name' and/or 'email'"
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = CustomerDraft {
            name: Some("   ".into()),
            email: Some("a@x.com".into()),
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, DomainError::MissingParameter(_)));
    }

    #[test]
    fn wrong_shapes_are_invalid_requests() {
        let err = CreateCustomersRequest::decode(json!(42)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidRequest(_)));

        let err = UpdateCustomerRequest::decode(json!({"name": 1})).unwrap_err();
        assert!(matches!(err, DomainError::InvalidRequest(_)));
    }

    #[test]
    fn null_body_behaves_like_empty_object() {
        let lookup = CustomerLookup::decode(JsonValue::Null).unwrap();
        assert_eq!(lookup.into_query().unwrap(), CustomerQuery::All);

        let drafts = CreateCustomersRequest::decode(JsonValue::Null).unwrap().into_drafts();
        assert!(drafts[0].clone().validate().is_err());
    }

    #[test]
    fn update_checks_attributes_before_id() {
        let err = UpdateCustomerRequest::default().validate().unwrap_err();
        assert_eq!(err, DomainError::missing(NAME_AND_EMAIL));

        let err = UpdateCustomerRequest {
            entity_id: None,
            name: Some("Alice".into()),
            email: Some("a@x.com".into()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.to_string(), "missing mandatory parameter 'entity_id'");
    }

    #[test]
    fn update_rejects_malformed_id() {
        let err = UpdateCustomerRequest {
            entity_id: Some("nope".into()),
            name: Some("Alice".into()),
            email: Some("a@x.com".into()),
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }

    #[test]
    fn update_keeps_the_given_id() {
        let id = EntityId::new();
        let customer = UpdateCustomerRequest {
            entity_id: Some(id.to_string()),
            name: Some("Alice".into()),
            email: Some("new@x.com".into()),
        }
        .validate()
        .unwrap()
        .into_customer();
        assert_eq!(customer.entity_id(), id);
        assert_eq!(customer.email(), "new@x.com");
    }

    #[test]
    fn lookup_resolves_ids() {
        let id = EntityId::new();
        let q = CustomerLookup {
            entity_id: Some(id.to_string()),
        }
        .into_query()
        .unwrap();
        assert_eq!(q, CustomerQuery::One(id));

        let err = CustomerLookup {
            entity_id: Some("garbage".into()),
        }
        .into_query()
        .unwrap_err();
        assert_eq!(err.to_string(), "could not find customer");
    }

    #[test]
    fn delete_requires_an_id() {
        let err = CustomerLookup::default().require_id().unwrap_err();
        assert_eq!(err, DomainError::missing(ENTITY_ID));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any non-blank name/email pair validates and is preserved verbatim.
        #[test]
        fn non_blank_drafts_validate(
            name in "[A-Za-z][A-Za-z ]{0,30}",
            email in "[a-z]{1,10}@[a-z]{1,10}\\.[a-z]{2,3}",
        ) {
            let v = CustomerDraft { name: Some(name.clone()), email: Some(email.clone()) }
                .validate()
                .unwrap();
            prop_assert_eq!(v.name, name);
            prop_assert_eq!(v.email, email);
        }

        /// Property: a draft lacking either field never validates.
        #[test]
        fn drafts_missing_a_field_never_validate(
            value in "[a-z]{1,10}",
            drop_name in any::<bool>(),
        ) {
            let draft = if drop_name {
                CustomerDraft { name: None, email: Some(value) }
            } else {
                CustomerDraft { name: Some(value), email: None }
            };
            prop_assert!(draft.validate().is_err());
        }
    }
}
