use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ticketdb_core::{
    Connection, DbError, PreparedStatement, QueryResult, Result as DbResult, StatementResult,
    Transaction, Value,
};

use super::Shared;
use crate::connection::{ConnectionId, ConnectionInfo, PoolConnection, Role};

/// How the connection goes back when the guard drops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Return {
    /// Released by a caller
    Release,
    /// Released by a caller after the driver reported the connection lost
    Discard,
    /// Borrowed by the reaper for validation
    PutBack,
}

/// Stands in for the handle once the guard no longer holds a connection
struct Detached;

static DETACHED: Detached = Detached;

#[async_trait]
impl Connection for Detached {
    fn driver_name(&self) -> &str {
        "detached"
    }

    async fn prepare(&self, _sql: &str) -> DbResult<Box<dyn PreparedStatement>> {
        Err(DbError::Closed)
    }

    async fn run(&self, _sql: &str, _params: &[Value]) -> DbResult<StatementResult> {
        Err(DbError::Closed)
    }

    async fn query_all(&self, _sql: &str, _params: &[Value]) -> DbResult<QueryResult> {
        Err(DbError::Closed)
    }

    async fn begin_transaction(&self) -> DbResult<Box<dyn Transaction>> {
        Err(DbError::Closed)
    }

    async fn close(&self) -> DbResult<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        true
    }
}

/// A connection checked out of the pool
///
/// Derefs to the underlying [`Connection`]. The connection goes back to the
/// pool when this guard is dropped, or through [`Pool::release`](super::Pool::release).
pub struct PooledConnection {
    id: ConnectionId,
    role: Role,
    conn: Option<PoolConnection>,
    shared: Arc<Shared>,
    on_drop: Return,
}

impl PooledConnection {
    pub(super) fn new(conn: PoolConnection, shared: Arc<Shared>) -> Self {
        Self::with_return(conn, shared, Return::Release)
    }

    /// Guard for a connection taken out by pool maintenance
    pub(crate) fn maintenance(conn: PoolConnection, shared: Arc<Shared>) -> Self {
        Self::with_return(conn, shared, Return::PutBack)
    }

    fn with_return(conn: PoolConnection, shared: Arc<Shared>, on_drop: Return) -> Self {
        Self {
            id: conn.id(),
            role: conn.role(),
            conn: Some(conn),
            shared,
            on_drop,
        }
    }

    /// Take the connection out without returning it to the pool
    pub(crate) fn detach(mut self) -> Option<PoolConnection> {
        self.conn.take()
    }

    /// Get the pool's identifier for this connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the set this connection belongs to
    pub fn role(&self) -> Role {
        self.role
    }

    /// Get a snapshot of this connection's usage metadata
    pub fn info(&self) -> Option<ConnectionInfo> {
        self.conn.as_ref().map(PoolConnection::info)
    }

    /// Record one query run on this connection.
    ///
    /// A connection-lost error marks the connection for closing on release.
    pub(crate) fn record_query(&mut self, latency: Duration, error: Option<&DbError>) {
        if let Some(conn) = self.conn.as_mut() {
            conn.record_query(latency);
        }
        if let Some(err) = error {
            if err.is_connection_lost() && self.on_drop == Return::Release {
                tracing::warn!(connection_id = %self.id, error = %err, "connection lost, closing it on release");
                self.on_drop = Return::Discard;
            }
        }
        let mut inner = self.shared.inner.lock();
        inner.counters.queries += 1;
        if error.is_some() {
            inner.counters.query_errors += 1;
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn.handle(),
            None => &DETACHED,
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            match self.on_drop {
                Return::Release => self.shared.check_in(conn),
                Return::Discard => self.shared.check_in_lost(conn),
                Return::PutBack => self.shared.put_back(conn),
            }
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .field("on_drop", &self.on_drop)
            .finish_non_exhaustive()
    }
}
