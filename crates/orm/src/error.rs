//! Error types for the database layer
//!
//! Provides the error taxonomy for connection management, query building,
//! transactions, and record persistence.

use std::fmt;

/// Result type alias for database operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for database operations
#[derive(Debug, Clone)]
pub enum OrmError {
    /// Database driver or query execution error
    Database(String),
    /// Connection or pool selection error
    Connection(String),
    /// Invalid or incomplete configuration
    Configuration(String),
    /// Query building error
    Query(String),
    /// Transaction error
    Transaction(String),
    /// Schema or metadata error
    Schema(String),
    /// Serialization/deserialization error
    Serialization(String),
    /// Record not found in the given table
    NotFound(String),
    /// Column missing from a result row
    ColumnNotFound(String),
    /// Attribute or key is missing or invalid
    InvalidKey(String),
    /// Relation resolution error
    Relation(String),
    /// Optimistic-lock version mismatch on update/delete
    StaleObject(String),
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrmError::Database(msg) => write!(f, "Database error: {}", msg),
            OrmError::Connection(msg) => write!(f, "Connection error: {}", msg),
            OrmError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            OrmError::Query(msg) => write!(f, "Query error: {}", msg),
            OrmError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
            OrmError::Schema(msg) => write!(f, "Schema error: {}", msg),
            OrmError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            OrmError::NotFound(table) => write!(f, "Record not found in table '{}'", table),
            OrmError::ColumnNotFound(column) => write!(f, "Column '{}' not found in result row", column),
            OrmError::InvalidKey(msg) => write!(f, "Invalid key error: {}", msg),
            OrmError::Relation(msg) => write!(f, "Relation error: {}", msg),
            OrmError::StaleObject(msg) => write!(f, "Stale object error: {}", msg),
        }
    }
}

impl std::error::Error for OrmError {}

// Convert from sqlx errors
impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        OrmError::Database(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}

impl OrmError {
    /// Whether this error is recoverable during pool selection.
    ///
    /// Connectivity errors are retried against the next pool candidate;
    /// everything else aborts selection immediately.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, OrmError::Connection(_) | OrmError::Database(_))
    }
}
