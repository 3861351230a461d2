//! Background maintenance
//!
//! Every `reap_interval` the reaper closes write connections idle past the
//! idle timeout (keeping `min_connections` open), tops the write set back
//! up to the minimum, and validates idle replicas.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::connection::Role;
use crate::events::{CloseReason, PoolEvent};
use crate::factory::ConnectTarget;
use crate::pool::{CreateSlot, PooledConnection, Shared};

/// Start the reaper for `shared`.
///
/// The task holds only a weak reference between cycles, so it never keeps
/// an otherwise unused pool alive.
pub(crate) fn spawn(shared: &Arc<Shared>) -> JoinHandle<()> {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let token = shared.shutdown.clone();
    let period = shared.config.reap_interval();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(shared) = weak.upgrade() else {
                break;
            };
            tokio::select! {
                _ = token.cancelled() => break,
                _ = run_cycle(&shared) => {}
            }
        }
        tracing::debug!("reaper stopped");
    })
}

/// One maintenance pass.
async fn run_cycle(shared: &Arc<Shared>) {
    reap_idle(shared);
    top_up(shared).await;
    probe_replicas(shared).await;
}

/// Reaped connections close on detached tasks, outliving a cancelled cycle.
fn reap_idle(shared: &Arc<Shared>) {
    let reaped = {
        let mut inner = shared.inner.lock();
        if inner.closed {
            return;
        }
        inner.take_reapable(
            Instant::now(),
            shared.config.idle_timeout(),
            shared.config.min_connections(),
        )
    };
    if reaped.is_empty() {
        return;
    }
    tracing::debug!(count = reaped.len(), "reaping idle connections");
    for conn in reaped {
        shared.close_detached(conn, CloseReason::Reaped);
    }
}

/// Reopen write connections lost to breakage until the minimum is met.
async fn top_up(shared: &Arc<Shared>) {
    let slots: Vec<CreateSlot> = {
        let mut inner = shared.inner.lock();
        if inner.closed {
            return;
        }
        let missing = shared
            .config
            .min_connections()
            .saturating_sub(inner.write.reserved());
        inner.write.pending += missing;
        (0..missing)
            .map(|_| CreateSlot::reserved(Arc::clone(shared), Role::Write, false))
            .collect()
    };
    if slots.is_empty() {
        return;
    }
    tracing::debug!(count = slots.len(), "restoring minimum write connections");
    for slot in slots {
        match shared.open(ConnectTarget::Primary).await {
            Ok(handle) => shared.admit(handle, Role::Write, slot),
            Err(err) => {
                {
                    let mut inner = shared.inner.lock();
                    slot.complete(&mut inner);
                    inner.counters.connection_errors += 1;
                }
                shared.emit(PoolEvent::BackgroundError(err));
            }
        }
    }
}

/// Validate idle replicas, replacing stale ones one-for-one.
async fn probe_replicas(shared: &Arc<Shared>) {
    if !shared.config.read_replicas_enabled() {
        return;
    }
    let probes: Vec<PooledConnection> = {
        let mut inner = shared.inner.lock();
        if inner.closed {
            return;
        }
        inner
            .take_idle_replicas(Instant::now())
            .into_iter()
            .map(|conn| PooledConnection::maintenance(conn, Arc::clone(shared)))
            .collect()
    };

    for probe in probes {
        if shared.factory.validate(&*probe).await {
            drop(probe);
            continue;
        }
        let Some(conn) = probe.detach() else {
            continue;
        };
        let role = conn.role();
        let Role::Replica(idx) = role else {
            continue;
        };
        let slot = {
            let mut inner = shared.inner.lock();
            inner.discard(&conn);
            inner.replicas.pending += 1;
            CreateSlot::reserved(Arc::clone(shared), role, false)
        };
        tracing::warn!(connection_id = %conn.id(), replica = idx, "replica failed validation, replacing it");
        shared.close_detached(conn, CloseReason::Stale);

        let Some(target) = shared.config.replicas().get(idx) else {
            continue;
        };
        match shared.open(ConnectTarget::Replica(target)).await {
            Ok(handle) => shared.admit(handle, role, slot),
            Err(err) => {
                {
                    let mut inner = shared.inner.lock();
                    slot.complete(&mut inner);
                    inner.counters.connection_errors += 1;
                }
                tracing::warn!(replica = idx, error = %err, "could not replace replica, reads fall back to the write set");
                shared.emit(PoolEvent::BackgroundError(err));
            }
        }
    }
}
