//! Error types for the mapping engine
//!
//! One public error enum covers metadata extraction, validation,
//! query execution, connection handling and transaction misuse.

use thiserror::Error;

/// Result type alias for engine operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error taxonomy for repository and query operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Bad or missing mapping metadata (no identity attribute, ambiguous column)
    #[error("mapping error: {0}")]
    Mapping(String),

    /// A declared constraint was violated before the write reached the backend
    #[error("validation error: {0}")]
    Validation(String),

    /// A predicate or raw query failed at the backend
    #[error("query error: {0}")]
    Query(String),

    /// Connection or session acquisition failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Transaction misuse or failure (double begin, commit without begin)
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Record encoding/decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl OrmError {
    /// Wrap a backend failure with the operation and collection it happened in.
    pub fn query_in(operation: &str, collection: &str, cause: impl std::fmt::Display) -> Self {
        OrmError::Query(format!("{} on '{}' failed: {}", operation, collection, cause))
    }
}

impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                OrmError::Connection(err.to_string())
            }
            other => OrmError::Query(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}
