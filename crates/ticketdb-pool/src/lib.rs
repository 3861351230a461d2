//! ticketdb Pool - connection pooling for the ticketing data layer
//!
//! This crate manages a bounded set of data-store connections: FIFO
//! acquisition with timeouts, hand-off on release, idle reaping, optional
//! read replicas, health classification and statistics.
//!
//! # Example
//!
//! ```ignore
//! use ticketdb_pool::{Access, Pool, PoolConfig};
//!
//! let config = PoolConfig::new(5, 20)
//!     .with_acquire_timeout_ms(5000)
//!     .with_read_replicas(["reports-replica"]);
//!
//! let pool = Pool::connect(config, connection_factory).await?;
//! let events = pool
//!     .execute("SELECT * FROM events WHERE id = ?", &[42.into()], Access::Read)
//!     .await?;
//! pool.shutdown().await;
//! ```

mod backoff;
mod config;
mod connection;
mod error;
pub mod events;
mod factory;
pub mod health;
mod pool;
mod queue;
mod reaper;
mod stats;

pub use backoff::BackoffStrategy;
pub use config::PoolConfig;
pub use connection::{Access, ConnectionId, ConnectionInfo, Role};
pub use error::{PoolError, PoolResult};
pub use events::{CloseReason, PoolEvent, PoolObserver, TracingObserver};
pub use factory::{ConnectTarget, ConnectionFactory};
pub use health::{HealthReport, HealthStatus, HealthThresholds};
pub use pool::{Pool, PooledConnection};
pub use stats::{PoolStats, SetStats};
