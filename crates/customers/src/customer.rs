use serde::{Deserialize, Serialize};

use storefront_core::{Entity, EntityId};

/// Customer entity.
///
/// The serialized form (`entity_id`, `name`, `email`) is the event payload
/// stored in the `customer` topic and the shape returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    entity_id: EntityId,
    name: String,
    email: String,
}

impl Customer {
    /// Entity factory: a new customer with a freshly generated identifier.
    ///
    /// Presence of `name` and `email` is the caller's concern (see
    /// [`CustomerDraft::validate`](crate::CustomerDraft::validate)).
    pub fn create(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::with_id(EntityId::new(), name, email)
    }

    /// Build a record for an existing identifier (replacement on update).
    pub fn with_id(entity_id: EntityId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            entity_id,
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

impl Entity for Customer {
    type Id = EntityId;

    fn id(&self) -> &Self::Id {
        &self.entity_id
    }
}
