//! Bookkeeping guarded by the pool mutex
//!
//! Nothing in here awaits. Every method runs with the pool lock held and
//! returns whatever must happen outside the lock (closing a connection,
//! spawning a creation) to the caller.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::connection::{Access, ConnectionId, PoolConnection, Role};
use crate::error::PoolError;
use crate::events::CloseReason;
use crate::queue::WaitQueue;
use crate::stats::{Counters, PoolStats, SetStats};

/// One class of connections (write or replica)
#[derive(Debug, Default)]
pub(crate) struct ConnectionSet {
    /// Idle connections ordered by last use, most recent at the back
    idle: VecDeque<PoolConnection>,
    /// Connections currently checked out
    active: HashSet<ConnectionId>,
    /// Incrementally maintained size of `active`
    active_count: usize,
    /// Connections being opened; they count against the size limit
    pub(crate) pending: usize,
}

impl ConnectionSet {
    /// Open connections, idle or active
    pub(crate) fn live(&self) -> usize {
        self.idle.len() + self.active.len()
    }

    /// Open connections plus those being opened
    pub(crate) fn reserved(&self) -> usize {
        self.live() + self.pending
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle.len()
    }

    /// Take the most recently used idle connection and mark it active.
    fn take_idle(&mut self, now: Instant) -> Option<PoolConnection> {
        let mut conn = self.idle.pop_back()?;
        self.track(&mut conn, now);
        Some(conn)
    }

    fn track(&mut self, conn: &mut PoolConnection, now: Instant) {
        conn.activate(now);
        if self.active.insert(conn.id()) {
            self.active_count += 1;
        }
    }

    fn untrack(&mut self, id: ConnectionId) -> bool {
        let removed = self.active.remove(&id);
        if removed {
            self.active_count -= 1;
        }
        removed
    }

    fn push_idle(&mut self, conn: PoolConnection) {
        debug_assert!(!conn.is_active());
        debug_assert!(
            self.idle
                .back()
                .is_none_or(|last| last.last_used_at() <= conn.last_used_at())
        );
        self.idle.push_back(conn);
    }

    fn stats(&self) -> SetStats {
        debug_assert_eq!(
            self.active_count,
            self.active.len(),
            "incremental active count drifted from the tracked set"
        );
        SetStats::new(self.active.len(), self.idle.len())
    }
}

/// What to do with a connection that came back to the pool
#[derive(Debug)]
pub(crate) enum CheckIn {
    /// Parked in the idle set
    Idle,
    /// Given straight to a waiter
    HandedOff,
    /// Must be closed outside the lock
    Close(PoolConnection, CloseReason),
}

/// All mutable pool state
#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub(crate) write: ConnectionSet,
    pub(crate) replicas: ConnectionSet,
    pub(crate) queue: WaitQueue,
    pub(crate) counters: Counters,
    pub(crate) closed: bool,
}

impl Inner {
    pub(crate) fn set_mut(&mut self, role: Role) -> &mut ConnectionSet {
        match role {
            Role::Write => &mut self.write,
            Role::Replica(_) => &mut self.replicas,
        }
    }

    /// Take an idle connection suitable for `access`.
    ///
    /// Reads prefer an idle replica when `use_replicas` is set and fall back
    /// to the write set.
    pub(crate) fn take_idle(
        &mut self,
        access: Access,
        use_replicas: bool,
        now: Instant,
    ) -> Option<PoolConnection> {
        if access.is_read() && use_replicas {
            if let Some(conn) = self.replicas.take_idle(now) {
                return Some(conn);
            }
        }
        self.write.take_idle(now)
    }

    /// Mark a freshly opened connection as checked out by its creator.
    pub(crate) fn track_new(&mut self, conn: &mut PoolConnection, now: Instant) {
        self.set_mut(conn.role()).track(conn, now);
    }

    /// A caller released `conn`.
    pub(crate) fn check_in(&mut self, conn: PoolConnection, now: Instant) -> CheckIn {
        let tracked = self.set_mut(conn.role()).untrack(conn.id());
        debug_assert!(tracked, "released connection {} was not checked out", conn.id());
        self.counters.released += 1;
        self.place(conn, now)
    }

    /// A caller released `conn` after the driver reported it unusable.
    pub(crate) fn check_in_lost(&mut self, mut conn: PoolConnection, now: Instant) -> CheckIn {
        let tracked = self.set_mut(conn.role()).untrack(conn.id());
        debug_assert!(tracked, "released connection {} was not checked out", conn.id());
        self.counters.released += 1;
        conn.deactivate(now);
        let reason = if self.closed {
            CloseReason::Shutdown
        } else {
            CloseReason::Broken
        };
        CheckIn::Close(conn, reason)
    }

    /// A connection taken out for maintenance goes back without counting as a release.
    pub(crate) fn put_back(&mut self, conn: PoolConnection, now: Instant) -> CheckIn {
        self.set_mut(conn.role()).untrack(conn.id());
        self.place(conn, now)
    }

    /// Stop tracking a checked-out connection that will be closed.
    pub(crate) fn discard(&mut self, conn: &PoolConnection) {
        self.set_mut(conn.role()).untrack(conn.id());
    }

    /// Hand an untracked connection to the oldest eligible waiter, or park it.
    pub(crate) fn place(&mut self, mut conn: PoolConnection, now: Instant) -> CheckIn {
        conn.deactivate(now);
        if self.closed {
            return CheckIn::Close(conn, CloseReason::Shutdown);
        }
        if conn.handle().is_closed() {
            return CheckIn::Close(conn, CloseReason::Broken);
        }
        match self.hand_off(conn, now) {
            None => CheckIn::HandedOff,
            Some(conn) => {
                self.set_mut(conn.role()).push_idle(conn);
                CheckIn::Idle
            }
        }
    }

    /// Give `conn` to the oldest waiter it may serve.
    ///
    /// Waiters whose acquire future is gone are skipped. Returns the
    /// connection if nobody took it.
    fn hand_off(&mut self, mut conn: PoolConnection, now: Instant) -> Option<PoolConnection> {
        while let Some(waiter) = self.queue.pop_eligible(conn.role()) {
            let id = conn.id();
            let role = conn.role();
            self.set_mut(role).track(&mut conn, now);
            match waiter.tx.send(Ok(conn)) {
                Ok(()) => {
                    let waited = now.saturating_duration_since(waiter.submitted_at);
                    self.counters.record_acquire(waited);
                    tracing::trace!(connection_id = %id, waiter = waiter.id, ?waited, "handed off");
                    return None;
                }
                Err(returned) => {
                    self.set_mut(role).untrack(id);
                    match returned {
                        Ok(mut back) => {
                            back.deactivate(now);
                            conn = back;
                        }
                        Err(_) => return None,
                    }
                }
            }
        }
        Some(conn)
    }

    /// Remove write connections idle longer than `idle_timeout`, never going
    /// below `min` live write connections. Oldest go first.
    pub(crate) fn take_reapable(
        &mut self,
        now: Instant,
        idle_timeout: Duration,
        min: usize,
    ) -> Vec<PoolConnection> {
        let surplus = self.write.live().saturating_sub(min);
        let mut reaped = Vec::new();
        while reaped.len() < surplus {
            let expired = self
                .write
                .idle
                .front()
                .is_some_and(|conn| conn.idle_for(now) > idle_timeout);
            if !expired {
                break;
            }
            if let Some(conn) = self.write.idle.pop_front() {
                reaped.push(conn);
            }
        }
        self.counters.reaped += reaped.len() as u64;
        reaped
    }

    /// Check out every idle replica for validation.
    pub(crate) fn take_idle_replicas(&mut self, now: Instant) -> Vec<PoolConnection> {
        let mut taken = Vec::with_capacity(self.replicas.idle.len());
        while let Some(conn) = self.replicas.take_idle(now) {
            taken.push(conn);
        }
        taken
    }

    /// Mark the pool closed, reject every waiter and take the idle
    /// connections for closing.
    ///
    /// Returns `None` if the pool was already closed.
    pub(crate) fn close(&mut self) -> Option<Vec<PoolConnection>> {
        if self.closed {
            return None;
        }
        self.closed = true;
        for waiter in self.queue.drain() {
            let _ = waiter.tx.send(Err(PoolError::ShuttingDown));
        }
        let mut idle: Vec<PoolConnection> = self.write.idle.drain(..).collect();
        idle.extend(self.replicas.idle.drain(..));
        Some(idle)
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats::new(
            self.write.stats(),
            self.replicas.stats(),
            self.queue.len(),
            &self.counters,
        )
    }
}
