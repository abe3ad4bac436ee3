//! Shared error taxonomy for the RDB key/value store.
//!
//! Every crate in the workspace reports failures as an [`RdbError`] wrapping
//! a stable [`ErrorKind`]. HTTP-facing crates map the kind to a status code;
//! the wire form carries the kind as a lowercase tag so clients across
//! languages can branch on it without parsing prose.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, wire-visible classification of an RDB failure.
///
/// Serializes as a lowercase snake-case string (e.g. `"not_found"`) so it can
/// round-trip through the JSON error body a server sends back to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The requested key has no value in the backend.
    NotFound,
    /// A value or envelope could not be decoded (bad JSON, unknown `type` tag).
    BadWireFormat,
    /// The underlying transport (HTTP connection, memcache socket) failed.
    TransportError,
    /// The backend is not open, or failed to open / reconnect.
    BackendUnavailable,
    /// The backend does not support the requested operation (e.g. iteration).
    NotImplemented,
    /// The key is not a valid key for this store (empty, non-UTF-8, etc).
    InvalidKey,
}

impl ErrorKind {
    /// Stable `&'static str` representation (e.g. `"not_found"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::BadWireFormat => "bad_wire_format",
            Self::TransportError => "transport_error",
            Self::BackendUnavailable => "backend_unavailable",
            Self::NotImplemented => "not_implemented",
            Self::InvalidKey => "invalid_key",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified RDB error.
///
/// Carries a machine-readable [`ErrorKind`], a human-readable message, and an
/// optional source for cause-chaining.
///
/// # Examples
///
/// ```
/// use rdb_error::{ErrorKind, RdbError};
///
/// let err = RdbError::new(ErrorKind::NotFound, "no value for key \"foo\"");
/// assert_eq!(err.kind, ErrorKind::NotFound);
/// ```
#[derive(Debug, thiserror::Error)]
#[error("[{kind}] {message}")]
pub struct RdbError {
    /// Machine-readable classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RdbError {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for constructing [`ErrorKind::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for constructing [`ErrorKind::BadWireFormat`].
    pub fn bad_wire_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadWireFormat, message)
    }

    /// Shorthand for constructing [`ErrorKind::TransportError`].
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportError, message)
    }

    /// Shorthand for constructing [`ErrorKind::BackendUnavailable`].
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    /// Shorthand for constructing [`ErrorKind::NotImplemented`].
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    /// Shorthand for constructing [`ErrorKind::InvalidKey`].
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidKey, message)
    }

    /// True if this error is a plain "no value for that key" miss.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Serialisable snapshot of an [`RdbError`] for wire transport (no opaque
/// source, since `Box<dyn Error>` is not `Serialize`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RdbErrorDto {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl From<&RdbError> for RdbErrorDto {
    fn from(err: &RdbError) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
        }
    }
}

impl From<RdbErrorDto> for RdbError {
    fn from(dto: RdbErrorDto) -> Self {
        Self::new(dto.kind, dto.message)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_wire_tags_are_snake_case() {
        assert_eq!(serde_json::to_string(&ErrorKind::NotFound).unwrap(), "\"not_found\"");
        assert_eq!(
            serde_json::to_string(&ErrorKind::BadWireFormat).unwrap(),
            "\"bad_wire_format\""
        );
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = RdbError::not_found("no value for key \"foo\"");
        assert_eq!(err.to_string(), "[not_found] no value for key \"foo\"");
    }

    #[test]
    fn dto_round_trips_through_json() {
        let err = RdbError::invalid_key("key must be non-empty");
        let dto = RdbErrorDto::from(&err);
        let json = serde_json::to_string(&dto).unwrap();
        let back: RdbErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dto);
        assert_eq!(back.kind, ErrorKind::InvalidKey);
    }

    #[test]
    fn source_chain_is_preserved() {
        let io_err = std::io::Error::other("boom");
        let err = RdbError::transport("connect failed").with_source(io_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
