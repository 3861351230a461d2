//! Error types for pool operations

use std::time::Duration;

use thiserror::Error;
use ticketdb_core::DbError;

/// Error returned by pool operations
///
/// `AcquireTimeout` is kept apart from `QueryExecution` so callers can apply a
/// different retry policy to "the pool is busy" than to "my query failed".
#[derive(Error, Debug)]
pub enum PoolError {
    /// A physical connection could not be opened, even after retrying
    #[error("failed to open connection to {target} after {attempts} attempt(s): {source}")]
    ConnectionCreation {
        /// Target that refused the connection ("primary" or a replica name)
        target: String,
        /// Number of attempts made
        attempts: u32,
        /// Last driver error
        #[source]
        source: DbError,
    },

    /// No connection became available within the acquire timeout
    #[error("timed out after {0:?} waiting for a connection")]
    AcquireTimeout(Duration),

    /// The caller's query or transaction failed
    #[error("query execution failed: {0}")]
    QueryExecution(#[source] DbError),

    /// The pool has been shut down
    #[error("pool is shutting down")]
    ShuttingDown,

    /// The pool configuration is invalid
    #[error("invalid pool configuration: {0}")]
    Configuration(String),

    /// A background task (reaper, replica probe) hit a fault
    #[error("pool background error: {0}")]
    Internal(String),
}

impl PoolError {
    /// Check if this error is an acquire timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::AcquireTimeout(_))
    }

    /// Get the underlying driver error, if there is one
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            PoolError::ConnectionCreation { source, .. } => Some(source),
            PoolError::QueryExecution(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for pool operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;
