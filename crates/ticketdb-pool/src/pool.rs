//! Connection pool implementation
//!
//! The pool keeps two connection sets: the write set, sized between
//! `min_connections` and `max_connections`, and an optional fixed set of
//! read-replica connections. Callers that find no idle connection and no
//! room to open one queue in FIFO order; a released connection goes to the
//! oldest eligible waiter before any new caller can see it.
//!
//! All bookkeeping lives behind one `parking_lot::Mutex` that is never held
//! across an `.await`. Waiters are completed only while that lock is held,
//! which is what lets a timed-out waiter decide, under the same lock,
//! whether it was already served.

mod guard;
mod inner;


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use ticketdb_core::{Connection, QueryResult, Result as DbResult, Transaction, Value};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::connection::{Access, PoolConnection, Role};
use crate::error::{PoolError, PoolResult};
use crate::events::{CloseReason, PoolEvent, PoolObserver};
use crate::factory::{ConnectTarget, ConnectionFactory, open_with_retry};
use crate::health::{HealthReport, PING_QUERY};
use crate::queue::Completion;
use crate::reaper;
use crate::stats::PoolStats;

pub use guard::PooledConnection;
pub(crate) use inner::{CheckIn, Inner};

/// State shared by every pool handle, guard and background task
pub(crate) struct Shared {
    pub(crate) config: PoolConfig,
    pub(crate) factory: Arc<dyn ConnectionFactory>,
    pub(crate) inner: Mutex<Inner>,
    observers: RwLock<Vec<Arc<dyn PoolObserver>>>,
    /// Cancelled on shutdown; stops the reaper
    pub(crate) shutdown: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn emit(&self, event: PoolEvent) {
        let observers = self.observers.read();
        for observer in observers.iter() {
            observer.on_event(&event);
        }
    }

    /// Open a physical connection, retrying per the pool configuration
    pub(crate) async fn open(&self, target: ConnectTarget<'_>) -> PoolResult<Box<dyn Connection>> {
        open_with_retry(self.factory.as_ref(), target, &self.config.retry_policy()).await
    }

    /// A guard released its connection
    pub(crate) fn check_in(self: &Arc<Self>, conn: PoolConnection) {
        let outcome = {
            let mut inner = self.inner.lock();
            inner.check_in(conn, Instant::now())
        };
        self.settle(outcome);
    }

    /// A guard released a connection whose driver reported it lost
    pub(crate) fn check_in_lost(self: &Arc<Self>, conn: PoolConnection) {
        let outcome = {
            let mut inner = self.inner.lock();
            inner.check_in_lost(conn, Instant::now())
        };
        self.settle(outcome);
    }

    /// Maintenance finished with a connection
    pub(crate) fn put_back(self: &Arc<Self>, conn: PoolConnection) {
        let outcome = {
            let mut inner = self.inner.lock();
            inner.put_back(conn, Instant::now())
        };
        self.settle(outcome);
    }

    /// Add a freshly opened connection, consuming its creation slot
    pub(crate) fn admit(self: &Arc<Self>, handle: Box<dyn Connection>, role: Role, slot: CreateSlot) {
        let conn = PoolConnection::new(handle, role);
        let id = conn.id();
        let outcome = {
            let mut inner = self.inner.lock();
            slot.complete(&mut inner);
            inner.place(conn, Instant::now())
        };
        tracing::debug!(connection_id = %id, %role, "connection created");
        self.emit(PoolEvent::ConnectionCreated { id, role });
        self.settle(outcome);
    }

    fn settle(self: &Arc<Self>, outcome: CheckIn) {
        if let CheckIn::Close(conn, reason) = outcome {
            let role = conn.role();
            if reason == CloseReason::Broken {
                tracing::warn!(connection_id = %conn.id(), %role, "discarding closed connection");
            }
            self.close_detached(conn, reason);
            if reason == CloseReason::Broken && role == Role::Write {
                self.replenish();
            }
        }
    }

    pub(crate) async fn close_now(&self, conn: PoolConnection, reason: CloseReason) {
        let id = conn.id();
        let role = conn.role();
        if let Err(err) = conn.close().await {
            tracing::warn!(connection_id = %id, %role, error = %err, "failed to close connection");
            self.emit(PoolEvent::BackgroundError(PoolError::Internal(format!(
                "failed to close connection {}: {}",
                id, err
            ))));
        }
        tracing::debug!(connection_id = %id, %role, ?reason, "connection closed");
        self.emit(PoolEvent::ConnectionClosed { id, role, reason });
    }

    pub(crate) fn close_detached(self: &Arc<Self>, conn: PoolConnection, reason: CloseReason) {
        let shared = Arc::clone(self);
        spawn_detached(async move { shared.close_now(conn, reason).await });
    }

    /// Open write connections in the background for queued callers
    pub(crate) fn replenish(self: &Arc<Self>) {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("no tokio runtime, cannot open connections for waiters");
            return;
        };
        let slots: Vec<CreateSlot> = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            let wanted = inner.queue.len().saturating_sub(inner.write.pending);
            let room = self
                .config
                .max_connections()
                .saturating_sub(inner.write.reserved());
            let count = wanted.min(room);
            inner.write.pending += count;
            (0..count)
                .map(|_| CreateSlot::reserved(Arc::clone(self), Role::Write, false))
                .collect()
        };
        if !slots.is_empty() {
            tracing::debug!(count = slots.len(), "opening connections for waiters");
        }
        for slot in slots {
            handle.spawn(Arc::clone(self).create_for_waiters(slot));
        }
    }

    async fn create_for_waiters(self: Arc<Self>, slot: CreateSlot) {
        match self.open(ConnectTarget::Primary).await {
            Ok(handle) => self.admit(handle, Role::Write, slot),
            Err(err) => {
                let mut inner = self.inner.lock();
                slot.complete(&mut inner);
                inner.counters.connection_errors += 1;
                // The oldest waiter asked for this connection; it gets the failure.
                match inner.queue.pop_eligible(Role::Write) {
                    Some(waiter) => {
                        let _ = waiter.tx.send(Err(err));
                    }
                    None => {
                        drop(inner);
                        self.emit(PoolEvent::BackgroundError(err));
                    }
                }
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A reserved place for a connection being opened
///
/// Dropping an armed slot (the opener was cancelled) gives the place back.
pub(crate) struct CreateSlot {
    shared: Arc<Shared>,
    role: Role,
    refill_on_cancel: bool,
    armed: bool,
}

impl CreateSlot {
    /// Wrap a reservation already counted in the set's `pending`
    pub(crate) fn reserved(shared: Arc<Shared>, role: Role, refill_on_cancel: bool) -> Self {
        Self {
            shared,
            role,
            refill_on_cancel,
            armed: true,
        }
    }

    pub(crate) fn complete(mut self, inner: &mut Inner) {
        let set = inner.set_mut(self.role);
        set.pending = set.pending.saturating_sub(1);
        self.armed = false;
    }
}

impl Drop for CreateSlot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let waiting = {
            let mut inner = self.shared.inner.lock();
            let set = inner.set_mut(self.role);
            set.pending = set.pending.saturating_sub(1);
            !inner.closed && !inner.queue.is_empty()
        };
        if waiting && self.refill_on_cancel {
            self.shared.replenish();
        }
    }
}

/// A queued acquire; removes itself from the queue if dropped unresolved
struct WaitTicket {
    shared: Arc<Shared>,
    id: u64,
    rx: oneshot::Receiver<Completion>,
    settled: bool,
}

impl Drop for WaitTicket {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let outcome = {
            let mut inner = self.shared.inner.lock();
            if inner.queue.remove(self.id) {
                return;
            }
            // Served between the caller giving up and now; return the connection.
            match self.rx.try_recv() {
                Ok(Ok(conn)) => inner.check_in(conn, Instant::now()),
                _ => return,
            }
        };
        self.shared.settle(outcome);
    }
}

enum Plan {
    Ready(PoolConnection),
    Create,
    Wait(u64, oneshot::Receiver<Completion>),
}

/// A pool of data-store connections
///
/// Cheap to clone; all clones share the same connections. Create one with
/// [`Pool::connect`] and pass it to whatever needs data access.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    /// Validate `config`, open the initial connections and start the reaper.
    ///
    /// Fails if the configuration is invalid or any of the `min_connections`
    /// write connections cannot be opened. A replica that cannot be opened
    /// is skipped; reads then use the write set.
    #[tracing::instrument(skip_all, fields(
        min = config.min_connections(),
        max = config.max_connections(),
        replicas = config.replicas().len()
    ))]
    pub async fn connect<F: ConnectionFactory>(config: PoolConfig, factory: F) -> PoolResult<Self> {
        config.validate()?;
        let factory: Arc<dyn ConnectionFactory> = Arc::new(factory);
        let policy = config.retry_policy();

        let mut opened = Vec::with_capacity(config.min_connections());
        for _ in 0..config.min_connections() {
            match open_with_retry(factory.as_ref(), ConnectTarget::Primary, &policy).await {
                Ok(handle) => opened.push(PoolConnection::new(handle, Role::Write)),
                Err(err) => {
                    for conn in opened {
                        if let Err(close_err) = conn.close().await {
                            tracing::debug!(error = %close_err, "failed to close connection during startup");
                        }
                    }
                    return Err(err);
                }
            }
        }

        let write_count = opened.len();
        if config.read_replicas_enabled() {
            for (idx, target) in config.replicas().iter().enumerate() {
                match open_with_retry(factory.as_ref(), ConnectTarget::Replica(target), &policy).await {
                    Ok(handle) => opened.push(PoolConnection::new(handle, Role::Replica(idx))),
                    Err(err) => {
                        tracing::warn!(replica = %target, error = %err, "replica unavailable, reads fall back to primary");
                    }
                }
            }
        }
        let replica_count = opened.len() - write_count;

        let mut inner = Inner::default();
        let now = Instant::now();
        for conn in opened {
            if let CheckIn::Close(conn, _) = inner.place(conn, now) {
                tracing::warn!(connection_id = %conn.id(), "new connection already closed, dropping it");
            }
        }

        let shared = Arc::new(Shared {
            config,
            factory,
            inner: Mutex::new(inner),
            observers: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
            reaper: Mutex::new(None),
        });
        let reaper = reaper::spawn(&shared);
        *shared.reaper.lock() = Some(reaper);

        tracing::info!(write = write_count, replicas = replica_count, "connection pool ready");
        Ok(Self { shared })
    }

    /// Check out a connection.
    ///
    /// Reads prefer an idle replica when replicas are enabled. With nothing
    /// idle, a new write connection is opened if the write set has room and
    /// nobody is queued; otherwise the caller waits in FIFO order for up to
    /// the acquire timeout.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn acquire(&self, access: Access) -> PoolResult<PooledConnection> {
        let shared = &self.shared;
        let submitted = Instant::now();
        let plan = {
            let mut inner = shared.inner.lock();
            if inner.closed {
                return Err(PoolError::ShuttingDown);
            }
            if let Some(conn) =
                inner.take_idle(access, shared.config.read_replicas_enabled(), submitted)
            {
                inner.counters.record_acquire(Duration::ZERO);
                Plan::Ready(conn)
            } else if inner.queue.is_empty()
                && inner.write.reserved() < shared.config.max_connections()
            {
                inner.write.pending += 1;
                Plan::Create
            } else {
                let (id, rx) = inner.queue.push(access, submitted);
                tracing::debug!(waiter = id, waiting = inner.queue.len(), "no connection available, waiting");
                Plan::Wait(id, rx)
            }
        };

        match plan {
            Plan::Ready(conn) => Ok(PooledConnection::new(conn, Arc::clone(shared))),
            Plan::Create => self.create_for_caller(submitted).await,
            Plan::Wait(id, rx) => {
                let ticket = WaitTicket {
                    shared: Arc::clone(shared),
                    id,
                    rx,
                    settled: false,
                };
                shared.replenish();
                self.wait(ticket, access, submitted).await
            }
        }
    }

    async fn create_for_caller(&self, submitted: Instant) -> PoolResult<PooledConnection> {
        let shared = &self.shared;
        let slot = CreateSlot::reserved(Arc::clone(shared), Role::Write, true);
        let opened = shared.open(ConnectTarget::Primary).await;

        let mut inner = shared.inner.lock();
        slot.complete(&mut inner);
        let handle = match opened {
            Ok(handle) => handle,
            Err(err) => {
                inner.counters.connection_errors += 1;
                // Callers queued behind this creation still need a connection.
                let waiting = !inner.closed && !inner.queue.is_empty();
                drop(inner);
                if waiting {
                    shared.replenish();
                }
                return Err(err);
            }
        };

        let mut conn = PoolConnection::new(handle, Role::Write);
        let id = conn.id();
        if inner.closed {
            drop(inner);
            shared.close_detached(conn, CloseReason::Shutdown);
            return Err(PoolError::ShuttingDown);
        }
        let now = Instant::now();
        inner.track_new(&mut conn, now);
        inner.counters.record_acquire(now.saturating_duration_since(submitted));
        drop(inner);

        tracing::debug!(connection_id = %id, "connection created on demand");
        shared.emit(PoolEvent::ConnectionCreated {
            id,
            role: Role::Write,
        });
        Ok(PooledConnection::new(conn, Arc::clone(shared)))
    }

    async fn wait(
        &self,
        mut ticket: WaitTicket,
        access: Access,
        submitted: Instant,
    ) -> PoolResult<PooledConnection> {
        let shared = &self.shared;
        let timeout = shared.config.acquire_timeout();

        let completion = match tokio::time::timeout_at(submitted + timeout, &mut ticket.rx).await {
            Ok(received) => {
                ticket.settled = true;
                received.map_err(|_| PoolError::Internal("wait entry dropped unresolved".into()))?
            }
            Err(_) => {
                let removed = {
                    let mut inner = shared.inner.lock();
                    let removed = inner.queue.remove(ticket.id);
                    if removed {
                        inner.counters.timeouts += 1;
                    }
                    removed
                };
                ticket.settled = true;
                if removed {
                    let waited = submitted.elapsed();
                    tracing::warn!(waiter = ticket.id, ?waited, ?access, "acquire timed out");
                    shared.emit(PoolEvent::AcquireTimedOut { waited, access });
                    return Err(PoolError::AcquireTimeout(timeout));
                }
                // Served just as the timer fired; the completion is already there.
                ticket.rx.try_recv().map_err(|_| {
                    PoolError::Internal("wait entry served without a completion".into())
                })?
            }
        };
        completion.map(|conn| PooledConnection::new(conn, Arc::clone(shared)))
    }

    /// Return a connection to the pool.
    ///
    /// Same as dropping the guard.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Run one statement on a pooled connection.
    ///
    /// Reads go through `query_all` and may be served by a replica; writes
    /// go through `run` on the write set. The connection is released whether
    /// or not the statement succeeds.
    pub async fn execute(&self, sql: &str, params: &[Value], access: Access) -> PoolResult<QueryResult> {
        let mut conn = self.acquire(access).await?;
        let started = Instant::now();
        let result = if access.is_read() {
            conn.query_all(sql, params).await
        } else {
            conn.run(sql, params).await.map(QueryResult::from)
        };
        conn.record_query(started.elapsed(), result.as_ref().err());
        if let Err(err) = &result {
            tracing::debug!(connection_id = %conn.id(), error = %err, "statement failed");
        }
        result.map_err(PoolError::QueryExecution)
    }

    /// Run `f` with a pooled connection and release it afterwards.
    pub async fn with_connection<T, F>(&self, access: Access, f: F) -> PoolResult<T>
    where
        F: for<'c> FnOnce(&'c dyn Connection) -> BoxFuture<'c, DbResult<T>> + Send,
        T: Send,
    {
        let mut conn = self.acquire(access).await?;
        let started = Instant::now();
        let result = f(&*conn).await;
        conn.record_query(started.elapsed(), result.as_ref().err());
        result.map_err(PoolError::QueryExecution)
    }

    /// Run `f` inside a transaction on a write connection.
    ///
    /// Commits when `f` succeeds and rolls back when it fails. The
    /// connection is released in every case.
    pub async fn transaction<T, F>(&self, f: F) -> PoolResult<T>
    where
        F: for<'t> FnOnce(&'t dyn Transaction) -> BoxFuture<'t, DbResult<T>> + Send,
        T: Send,
    {
        let mut conn = self.acquire(Access::Write).await?;
        let started = Instant::now();
        let result = run_transaction(&*conn, f).await;
        conn.record_query(started.elapsed(), result.as_ref().err());
        if let Err(err) = &result {
            tracing::debug!(connection_id = %conn.id(), error = %err, "transaction failed");
        }
        result.map_err(PoolError::QueryExecution)
    }

    /// Ping a write connection and classify the pool's health.
    ///
    /// Never fails: acquisition or ping errors produce an unhealthy report.
    #[tracing::instrument(skip(self))]
    pub async fn health_check(&self) -> HealthReport {
        let conn = match self.acquire(Access::Write).await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(error = %err, "health check could not acquire a connection");
                return HealthReport::failed(err, self.stats());
            }
        };
        if conn.is_closed() {
            drop(conn);
            return HealthReport::failed("connection is closed", self.stats());
        }

        let started = Instant::now();
        let pinged = conn.query_one(PING_QUERY, &[]).await;
        let latency = started.elapsed();
        drop(conn);

        let report = match pinged {
            Ok(_) => HealthReport::measured(latency, self.stats(), self.shared.config.health_thresholds()),
            Err(err) => HealthReport::failed(format!("ping failed: {}", err), self.stats()),
        };
        tracing::debug!(status = ?report.status, latency_ms = ?report.latency_ms, "health check finished");
        report
    }

    /// Get a snapshot of pool statistics
    pub fn stats(&self) -> PoolStats {
        self.shared.inner.lock().stats()
    }

    /// Shut the pool down.
    ///
    /// Stops the reaper, rejects queued callers with `ShuttingDown` and
    /// closes idle connections. Connections still checked out are closed as
    /// they come back. Calling this again does nothing.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        let closing = shared.inner.lock().close();
        let Some(idle) = closing else {
            tracing::debug!("pool already shut down");
            return;
        };

        shared.shutdown.cancel();
        let reaper = shared.reaper.lock().take();
        if let Some(reaper) = reaper {
            if let Err(err) = reaper.await {
                tracing::warn!(error = %err, "reaper task ended abnormally");
            }
        }

        let count = idle.len();
        for conn in idle {
            shared.close_now(conn, CloseReason::Shutdown).await;
        }
        shared.emit(PoolEvent::Shutdown);
        tracing::info!(closed = count, "connection pool shut down");
    }

    /// Check if the pool has been shut down
    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    /// Register an observer for pool events
    pub fn subscribe(&self, observer: impl PoolObserver + 'static) {
        self.shared.observers.write().push(Arc::new(observer));
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

async fn run_transaction<T, F>(conn: &dyn Connection, f: F) -> DbResult<T>
where
    F: for<'t> FnOnce(&'t dyn Transaction) -> BoxFuture<'t, DbResult<T>>,
{
    let tx = conn.begin_transaction().await?;
    let outcome = f(tx.as_ref()).await;
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

/// Spawn background work if a runtime is available
fn spawn_detached<F>(work: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(work);
            true
        }
        Err(_) => {
            tracing::warn!("no tokio runtime, dropping background pool work");
            false
        }
    }
}
