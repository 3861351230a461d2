//! Error types for data-store drivers

use thiserror::Error;

/// Error reported by a data-store driver
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Connection is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Whether this error means the physical connection itself is unusable.
    ///
    /// Query-level failures leave the connection reusable; these do not.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, DbError::Connection(_) | DbError::Closed | DbError::Io(_))
    }
}

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DbError>;
