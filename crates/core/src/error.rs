//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// These are the failures a caller can act on: a request that is incomplete or
/// malformed, or one that refers to something that does not exist. The `Display`
/// output is what ends up in the `error` field of a response, so the wording is
/// part of the wire contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A mandatory request field was absent (or blank).
    #[error("missing mandatory parameter {0}")]
    MissingParameter(String),

    /// The referenced entity does not exist.
    #[error("could not find {0}")]
    NotFound(String),

    /// The request body had the wrong shape (e.g. a number where an object is expected).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    /// `params` is rendered verbatim, e.g. `"'name' and/or 'email'"`.
    pub fn missing(params: impl Into<String>) -> Self {
        Self::MissingParameter(params.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_response_wording() {
        assert_eq!(
            DomainError::missing("'name' and/or 'email'").to_string(),
            "missing mandatory parameter 'name' and/or 'email'"
        );
        assert_eq!(
            DomainError::not_found("customer").to_string(),
            "could not find customer"
        );
    }
}
