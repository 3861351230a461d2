//! Opening physical connections

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ticketdb_core::{Connection, Result as DbResult};

use crate::backoff::RetryPolicy;
use crate::error::{PoolError, PoolResult};

/// Where a new connection should point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectTarget<'a> {
    /// The primary (write) data store
    Primary,
    /// A read replica, as named in the pool configuration
    Replica(&'a str),
}

impl fmt::Display for ConnectTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectTarget::Primary => write!(f, "primary"),
            ConnectTarget::Replica(name) => write!(f, "replica {}", name),
        }
    }
}

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new connection to the given target
    async fn connect(&self, target: ConnectTarget<'_>) -> DbResult<Box<dyn Connection>>;

    /// Validate that an idle connection is still usable
    ///
    /// Default implementation only checks that it is not closed.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn connect(&self, target: ConnectTarget<'_>) -> DbResult<Box<dyn Connection>> {
        (**self).connect(target).await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Open a connection, retrying with backoff per `policy`
pub(crate) async fn open_with_retry(
    factory: &dyn ConnectionFactory,
    target: ConnectTarget<'_>,
    policy: &RetryPolicy,
) -> PoolResult<Box<dyn Connection>> {
    let attempts = policy.max_attempts();
    let mut attempt = 0;
    loop {
        match factory.connect(target).await {
            Ok(conn) => {
                if attempt > 0 {
                    tracing::info!(%target, attempt = attempt + 1, "connection opened after retry");
                }
                return Ok(conn);
            }
            Err(source) if attempt + 1 >= attempts => {
                tracing::error!(%target, attempts, error = %source, "giving up opening connection");
                return Err(PoolError::ConnectionCreation {
                    target: target.to_string(),
                    attempts,
                    source,
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    %target,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "failed to open connection, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
