//! FIFO queue of pending acquisitions

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::connection::{Access, PoolConnection, Role};
use crate::error::PoolResult;

/// Completion sent to a waiting acquirer
pub(crate) type Completion = PoolResult<PoolConnection>;

/// A caller blocked in `acquire`
#[derive(Debug)]
pub(crate) struct Waiter {
    pub(crate) id: u64,
    pub(crate) access: Access,
    pub(crate) submitted_at: Instant,
    pub(crate) tx: oneshot::Sender<Completion>,
}

/// Pending acquisitions in submission order
#[derive(Debug, Default)]
pub(crate) struct WaitQueue {
    waiters: VecDeque<Waiter>,
    next_id: u64,
}

impl WaitQueue {
    /// Enqueue a new waiter at the tail.
    pub(crate) fn push(&mut self, access: Access, now: Instant) -> (u64, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        self.waiters.push_back(Waiter {
            id,
            access,
            submitted_at: now,
            tx,
        });
        (id, rx)
    }

    /// Remove the oldest waiter a connection with `role` may serve.
    ///
    /// Write connections serve the head of the queue; replica connections
    /// skip over write waiters to the oldest read waiter.
    pub(crate) fn pop_eligible(&mut self, role: Role) -> Option<Waiter> {
        let pos = self.waiters.iter().position(|w| w.access.accepts(role))?;
        self.waiters.remove(pos)
    }

    /// Remove a waiter by id, e.g. when it timed out or was dropped.
    ///
    /// Returns false if the waiter has already been serviced.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        // The timed-out waiter is usually the head.
        if self.waiters.front().is_some_and(|w| w.id == id) {
            self.waiters.pop_front();
            return true;
        }
        match self.waiters.iter().position(|w| w.id == id) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Take every waiter, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<Waiter> {
        self.waiters.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
