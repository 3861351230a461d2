//! Pool lifecycle events and observers

use std::time::Duration;

use crate::connection::{Access, ConnectionId, Role};
use crate::error::PoolError;

/// Why a connection was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Idle past the idle timeout and above the minimum
    Reaped,
    /// The pool was shut down
    Shutdown,
    /// The driver reported the handle closed when it came back
    Broken,
    /// A replica failed validation
    Stale,
}

/// Something that happened inside the pool
#[derive(Debug)]
pub enum PoolEvent {
    /// A physical connection was opened
    ConnectionCreated { id: ConnectionId, role: Role },
    /// A physical connection was closed
    ConnectionClosed {
        id: ConnectionId,
        role: Role,
        reason: CloseReason,
    },
    /// An acquire gave up waiting
    AcquireTimedOut { waited: Duration, access: Access },
    /// A background task hit an error that no caller will see
    BackgroundError(PoolError),
    /// The pool was shut down
    Shutdown,
}

/// Receives pool events
///
/// Called synchronously from the pool, possibly while a connection is being
/// released, so implementations should not block.
pub trait PoolObserver: Send + Sync {
    fn on_event(&self, event: &PoolEvent);
}

impl<F> PoolObserver for F
where
    F: Fn(&PoolEvent) + Send + Sync,
{
    fn on_event(&self, event: &PoolEvent) {
        self(event)
    }
}

/// Observer that writes every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PoolObserver for TracingObserver {
    fn on_event(&self, event: &PoolEvent) {
        match event {
            PoolEvent::ConnectionCreated { id, role } => {
                tracing::debug!(connection_id = %id, %role, "connection created");
            }
            PoolEvent::ConnectionClosed { id, role, reason } => {
                tracing::debug!(connection_id = %id, %role, ?reason, "connection closed");
            }
            PoolEvent::AcquireTimedOut { waited, access } => {
                tracing::warn!(?waited, ?access, "acquire timed out");
            }
            PoolEvent::BackgroundError(err) => {
                tracing::error!(error = %err, "pool background error");
            }
            PoolEvent::Shutdown => {
                tracing::info!("pool shut down");
            }
        }
    }
}
