//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// An entity keeps its identifier for its whole lifetime; every other attribute
/// may be replaced by later events.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
