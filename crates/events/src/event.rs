use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "entity_created").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Lifecycle step of an entity, as recorded in a topic's event stream.
///
/// The wire names are shared with every other service publishing to the
/// same store, so they must not change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityAction {
    #[serde(rename = "entity_created")]
    Created,
    #[serde(rename = "entity_updated")]
    Updated,
    #[serde(rename = "entity_deleted")]
    Deleted,
}

impl EntityAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityAction::Created => "entity_created",
            EntityAction::Updated => "entity_updated",
            EntityAction::Deleted => "entity_deleted",
        }
    }

    /// Parse a stored `event_type`. Returns `None` for event types that are not
    /// entity lifecycle events.
    pub fn parse(event_type: &str) -> Option<Self> {
        match event_type {
            "entity_created" => Some(EntityAction::Created),
            "entity_updated" => Some(EntityAction::Updated),
            "entity_deleted" => Some(EntityAction::Deleted),
            _ => None,
        }
    }
}

impl core::fmt::Display for EntityAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an `event_type` is not an entity lifecycle action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity action: {0}")]
pub struct UnknownAction(pub String);

impl core::str::FromStr for EntityAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownAction(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_serde() {
        for action in [EntityAction::Created, EntityAction::Updated, EntityAction::Deleted] {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, serde_json::Value::String(action.as_str().to_string()));
            assert_eq!(action.as_str().parse::<EntityAction>().unwrap(), action);
        }
    }

    #[test]
    fn foreign_event_types_are_not_actions() {
        assert_eq!(EntityAction::parse("order_shipped"), None);
        assert!("order_shipped".parse::<EntityAction>().is_err());
    }
}
