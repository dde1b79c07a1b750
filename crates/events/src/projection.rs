use serde_json::Value as JsonValue;

use crate::EventEnvelope;

/// A projection builds a read model from an append-only event stream.
///
/// Projections are the CQRS read side: they fold events (write model) into
/// queryable state. Read models are **disposable**; they can be dropped and
/// rebuilt from the event store at any time.
///
/// ## Idempotency
///
/// Applying the same envelope twice must leave the read model unchanged. The
/// usual strategy is a cursor over `sequence_number`: anything at or below the
/// cursor has already been applied and is skipped.
///
/// ## Concurrency
///
/// Methods take `&self`; implementations serialize writers internally so a live
/// subscriber and a catch-up replay can run against the same instance.
pub trait Projection: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    /// Apply one published envelope. Envelopes for other topics are ignored.
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), Self::Error>;

    /// Drop the current read model and replay `envelopes` from scratch.
    fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), Self::Error>
    where
        Self: Sized;

    /// Highest `sequence_number` applied so far (0 when empty).
    fn cursor(&self) -> u64;
}
