//! Scriptable in-memory connections for pool integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use ticketdb_core::{
    Connection, DbError, PreparedStatement, QueryResult, Result, Row, StatementResult,
    Transaction, Value,
};
use ticketdb_pool::{ConnectTarget, ConnectionFactory, Pool, PoolEvent};

/// Initialize logging for tests if not already initialized
pub fn init_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("ticketdb_pool=debug".parse().unwrap()),
            )
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Knobs and counters shared by a factory and every connection it opened
#[derive(Default)]
pub struct MockState {
    /// Connections opened, per target
    pub opened: AtomicUsize,
    pub opened_replicas: AtomicUsize,
    /// Connect attempts, successful or not
    pub connect_attempts: AtomicUsize,
    /// Fail this many upcoming connect attempts
    pub fail_connects: AtomicU32,
    /// Artificial latency for every query, in ms
    pub query_delay_ms: AtomicU64,
    /// Artificial latency for closing a connection, in ms
    pub close_delay_ms: AtomicU64,
    pub closed: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    /// Closed flags of every connection, with its target
    handles: Mutex<Vec<(String, Arc<AtomicBool>)>>,
}

impl MockState {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_query_delay(&self, delay: Duration) {
        self.query_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_close_delay(&self, delay: Duration) {
        self.close_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Mark every open connection to `target` as closed by the server
    pub fn break_target(&self, target: &str) -> usize {
        let handles = self.handles.lock();
        let mut broken = 0;
        for (name, closed) in handles.iter() {
            if name == target && !closed.swap(true, Ordering::SeqCst) {
                broken += 1;
            }
        }
        broken
    }

    async fn delay(&self) {
        let ms = self.query_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

/// Connection factory backed by [`MockConnection`]
#[derive(Clone, Default)]
pub struct MockFactory {
    pub state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn connect(&self, target: ConnectTarget<'_>) -> Result<Box<dyn Connection>> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .state
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DbError::Connection(format!("{} refused the connection", target)));
        }

        let name = match target {
            ConnectTarget::Primary => "primary".to_string(),
            ConnectTarget::Replica(name) => {
                self.state.opened_replicas.fetch_add(1, Ordering::SeqCst);
                name.to_string()
            }
        };
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        let closed = Arc::new(AtomicBool::new(false));
        self.state
            .handles
            .lock()
            .push((name.clone(), Arc::clone(&closed)));
        Ok(Box::new(MockConnection {
            target: name,
            state: Arc::clone(&self.state),
            closed,
        }))
    }
}

/// In-memory connection; every query answers with the target it ran on
pub struct MockConnection {
    target: String,
    state: Arc<MockState>,
    closed: Arc<AtomicBool>,
}

/// `FAIL` in the SQL fails the query; `LOST` fails it as if the server went away
fn refused(sql: &str) -> Option<DbError> {
    if sql.contains("LOST") {
        Some(DbError::Connection("server closed the connection".to_string()))
    } else if sql.contains("FAIL") {
        Some(DbError::Query(format!("rejected: {}", sql)))
    } else {
        None
    }
}

fn answer(target: &str, sql: &str) -> Result<QueryResult> {
    if let Some(err) = refused(sql) {
        return Err(err);
    }
    let columns = vec!["served_by".to_string()];
    let row = Row::new(columns.clone(), vec![Value::from(target)]);
    Ok(QueryResult::with_rows(columns, vec![row]))
}

fn affected(sql: &str) -> Result<StatementResult> {
    if let Some(err) = refused(sql) {
        return Err(err);
    }
    Ok(StatementResult {
        affected_rows: 1,
        last_insert_id: None,
    })
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn prepare(&self, _sql: &str) -> Result<Box<dyn PreparedStatement>> {
        Err(DbError::NotSupported("prepared statements".into()))
    }

    async fn run(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.state.delay().await;
        affected(sql)
    }

    async fn query_all(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.state.delay().await;
        answer(&self.target, sql)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MockTransaction {
            target: self.target.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&self) -> Result<()> {
        let ms = self.state.close_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockTransaction {
    target: String,
    state: Arc<MockState>,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query_all(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        answer(&self.target, sql)
    }

    async fn run(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        affected(sql)
    }
}

/// Record a short label for every pool event
pub fn record_events(pool: &Pool) -> Arc<Mutex<Vec<String>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    pool.subscribe(move |event: &PoolEvent| {
        let label = match event {
            PoolEvent::ConnectionCreated { role, .. } => format!("created:{}", role),
            PoolEvent::ConnectionClosed { reason, .. } => format!("closed:{:?}", reason),
            PoolEvent::AcquireTimedOut { .. } => "timeout".to_string(),
            PoolEvent::BackgroundError(_) => "background_error".to_string(),
            PoolEvent::Shutdown => "shutdown".to_string(),
        };
        sink.lock().push(label);
    });
    events
}

/// Name of the target that served a query result
pub fn served_by(result: &QueryResult) -> Option<&str> {
    result.rows.first()?.get(0)?.as_str()
}

/// Let spawned pool tasks run
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
