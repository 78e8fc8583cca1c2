//! Error types for insights-core

use thiserror::Error;

/// Boxed error returned by [`crate::source::ActivitySource`] implementations.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the insights-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Unrecognized time-range token
    #[error("invalid time range: {0}")]
    InvalidRange(String),

    /// Malformed scope identifier
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// Page size of zero or an offset that overflows
    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    /// Failure reported by the activity store behind an engine query
    #[error("data source error in {operation}: {source}")]
    DataSource {
        operation: &'static str,
        #[source]
        source: SourceError,
    },

    /// SQLite error from the bundled activity store
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Activity store unusable, e.g. its connection lock was poisoned
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON encoding error at the transport boundary
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a data-source failure, tagging it with the query that failed.
    pub fn data_source(operation: &'static str, source: SourceError) -> Self {
        Error::DataSource { operation, source }
    }

    /// Classify this error for the transport layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRange(_) => ErrorKind::InvalidRange,
            Error::InvalidScope(_) => ErrorKind::InvalidScope,
            Error::InvalidPagination(_) => ErrorKind::InvalidPagination,
            Error::DataSource { .. } | Error::Database(_) | Error::Storage(_) => {
                ErrorKind::DataSourceFailure
            }
            Error::Serialization(_) => ErrorKind::SerializationFailure,
            Error::Config(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Failure kinds surfaced to callers, each with a stable code and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRange,
    InvalidPagination,
    InvalidScope,
    DataSourceFailure,
    SerializationFailure,
    /// Host setup problems (config, filesystem). Never produced by a query.
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRange => "invalid_range",
            ErrorKind::InvalidPagination => "invalid_pagination",
            ErrorKind::InvalidScope => "invalid_scope",
            ErrorKind::DataSourceFailure => "data_source_failure",
            ErrorKind::SerializationFailure => "serialization_failure",
            ErrorKind::Internal => "internal_error",
        }
    }

    /// HTTP-style status a transport should answer with.
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::InvalidRange => 400,
            ErrorKind::InvalidScope => 403,
            ErrorKind::InvalidPagination => 422,
            ErrorKind::SerializationFailure => 500,
            ErrorKind::Internal => 500,
            ErrorKind::DataSourceFailure => 503,
        }
    }

    /// Whether the caller sent something the engine refuses to run.
    pub fn is_caller_error(&self) -> bool {
        self.status() < 500
    }
}

/// Result type alias for insights-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_query_kinds_have_distinct_codes_and_statuses() {
        let kinds = [
            ErrorKind::InvalidRange,
            ErrorKind::InvalidPagination,
            ErrorKind::InvalidScope,
            ErrorKind::DataSourceFailure,
            ErrorKind::SerializationFailure,
        ];

        let codes: HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        let statuses: HashSet<_> = kinds.iter().map(|k| k.status()).collect();
        assert_eq!(codes.len(), kinds.len());
        assert_eq!(statuses.len(), kinds.len());
    }

    #[test]
    fn test_data_source_error_keeps_source() {
        let inner: SourceError = "connection reset".into();
        let err = Error::data_source("top_channels", inner);

        assert_eq!(err.kind(), ErrorKind::DataSourceFailure);
        assert!(err.to_string().contains("top_channels"));
        assert!(err.to_string().contains("connection reset"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_caller_errors() {
        assert!(ErrorKind::InvalidRange.is_caller_error());
        assert!(ErrorKind::InvalidScope.is_caller_error());
        assert!(!ErrorKind::DataSourceFailure.is_caller_error());
    }
}
