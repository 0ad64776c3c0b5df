//! Error types for entity resolution and trend detection.

use thiserror::Error;

/// Result type alias using the entities error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the entity/trend core.
#[derive(Error, Debug)]
pub enum Error {
    /// Mention cannot be resolved (empty text or missing type)
    #[error("Invalid mention: {0}")]
    InvalidMention(String),

    /// Storage failure, surfaced unchanged
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Stored profile metadata failed validation on read
    #[error("Corrupt profile: {0}")]
    CorruptProfile(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unknown time unit name
    #[error("Unsupported time unit: {0}")]
    UnsupportedTimeUnit(String),

    /// Window or duration outside the representable range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with any context layers stripped.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is an invalid-mention error.
    pub fn is_invalid_mention(&self) -> bool {
        matches!(self.root(), Self::InvalidMention(_))
    }

    /// Check if this is a persistence error.
    pub fn is_persistence(&self) -> bool {
        matches!(self.root(), Self::Persistence(_))
    }

    /// Whether retrying the same persistence step may succeed.
    ///
    /// Only lock contention qualifies; resolution never needs to be recomputed.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Self::Persistence(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        )
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::InvalidMention("empty text".into()).with_context("document doc-1");
        assert!(matches!(err, Error::WithContext { .. }));
        assert!(err.is_invalid_mention());
        assert_eq!(err.to_string(), "document doc-1: Invalid mention: empty text");
    }

    #[test]
    fn test_retryable_classification() {
        let err = Error::from(busy());
        assert!(err.is_persistence());
        assert!(err.is_retryable());
        assert!(err.with_context("upsert profile").is_retryable());

        let not_found = Error::Persistence(rusqlite::Error::QueryReturnedNoRows);
        assert!(!not_found.is_retryable());
        assert!(!Error::InvalidMention("x".into()).is_retryable());
    }

    #[test]
    fn test_result_ext_context() {
        let result: std::result::Result<(), rusqlite::Error> = Err(busy());
        let err = result.context("append mention").unwrap_err();
        assert!(err.to_string().starts_with("append mention: Persistence error"));
    }
}
