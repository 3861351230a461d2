//! Pooled connection bookkeeping

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ticketdb_core::Connection;
use tokio::time::Instant;
use uuid::Uuid;

use crate::stats::RunningAverage;

/// Opaque identifier of one pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which connection set a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Primary connection; serves writes, transactions and reads
    Write,
    /// Read-only replica connection; the index points into the configured replica targets
    Replica(usize),
}

impl Role {
    /// Check if this is a replica connection
    pub fn is_replica(&self) -> bool {
        matches!(self, Role::Replica(_))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Write => write!(f, "write"),
            Role::Replica(idx) => write!(f, "replica-{}", idx),
        }
    }
}

/// Kind of access requested when acquiring a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Read-only work; may be served by a replica
    Read,
    /// Work that modifies data; always served by the write set
    Write,
}

impl Access {
    /// Build from an "is read operation" flag
    pub fn from_read_flag(is_read: bool) -> Self {
        if is_read { Access::Read } else { Access::Write }
    }

    /// Check if this is read access
    pub fn is_read(&self) -> bool {
        matches!(self, Access::Read)
    }

    /// Whether a connection with the given role may serve this access
    pub(crate) fn accepts(&self, role: Role) -> bool {
        match role {
            Role::Write => true,
            Role::Replica(_) => self.is_read(),
        }
    }
}

/// Point-in-time view of a pooled connection's usage metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    /// Connection identifier
    pub id: ConnectionId,
    /// Connection set the connection belongs to
    pub role: Role,
    /// Time since the connection was opened
    pub age: Duration,
    /// Time since the connection was last acquired or released
    pub since_last_used: Duration,
    /// Whether the connection is checked out
    pub active: bool,
    /// Number of queries run on the connection
    pub query_count: u64,
    /// Running average query latency in milliseconds
    pub avg_query_ms: f64,
}

/// A physical connection plus the metadata the pool keeps about it
pub(crate) struct PoolConnection {
    id: ConnectionId,
    role: Role,
    handle: Box<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
    active: bool,
    query_latency: RunningAverage,
}

impl PoolConnection {
    pub(crate) fn new(handle: Box<dyn Connection>, role: Role) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            role,
            handle,
            created_at: now,
            last_used_at: now,
            active: false,
            query_latency: RunningAverage::default(),
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn handle(&self) -> &(dyn Connection + 'static) {
        self.handle.as_ref()
    }

    pub(crate) fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    /// Idle → Active
    pub(crate) fn activate(&mut self, now: Instant) {
        self.active = true;
        self.last_used_at = now;
    }

    /// Active → Idle
    pub(crate) fn deactivate(&mut self, now: Instant) {
        self.active = false;
        self.last_used_at = now;
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }

    pub(crate) fn record_query(&mut self, latency: Duration) {
        self.query_latency.record(latency.as_secs_f64() * 1000.0);
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        let now = Instant::now();
        ConnectionInfo {
            id: self.id,
            role: self.role,
            age: now.saturating_duration_since(self.created_at),
            since_last_used: self.idle_for(now),
            active: self.active,
            query_count: self.query_latency.count(),
            avg_query_ms: self.query_latency.mean(),
        }
    }

    /// Close the physical connection, consuming the bookkeeping wrapper
    pub(crate) async fn close(self) -> ticketdb_core::Result<()> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle.close().await
    }
}

impl fmt::Debug for PoolConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConnection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("driver", &self.handle.driver_name())
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .field("active", &self.active)
            .field("query_latency", &self.query_latency)
            .finish()
    }
}
