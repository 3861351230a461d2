//! Pool statistics types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Incrementally maintained mean: `avg' = (avg * (n - 1) + sample) / n`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct RunningAverage {
    count: u64,
    mean: f64,
}

impl RunningAverage {
    pub(crate) fn record(&mut self, sample: f64) {
        self.count += 1;
        let n = self.count as f64;
        self.mean = (self.mean * (n - 1.0) + sample) / n;
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn mean(&self) -> f64 {
        self.mean
    }
}

/// Counts for one connection set (write or replica)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStats {
    /// Total number of open connections (idle + active)
    pub total: usize,
    /// Number of connections currently checked out
    pub active: usize,
    /// Number of idle connections available
    pub idle: usize,
}

impl SetStats {
    pub(crate) fn new(active: usize, idle: usize) -> Self {
        Self {
            total: active + idle,
            active,
            idle,
        }
    }
}

/// Cumulative counters kept alongside the connection sets
#[derive(Debug, Clone, Default)]
pub(crate) struct Counters {
    pub(crate) acquired: u64,
    pub(crate) released: u64,
    pub(crate) queries: u64,
    pub(crate) query_errors: u64,
    pub(crate) connection_errors: u64,
    pub(crate) timeouts: u64,
    pub(crate) reaped: u64,
    pub(crate) acquire_latency: RunningAverage,
}

impl Counters {
    pub(crate) fn record_acquire(&mut self, waited: Duration) {
        self.acquired += 1;
        self.acquire_latency.record(waited.as_secs_f64() * 1000.0);
    }
}

/// Statistics about a connection pool's current state
///
/// Set counts are a point-in-time scan; the rest are cumulative since the
/// pool was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Write (primary) connection set
    write: SetStats,
    /// Read-replica connection set
    replica: SetStats,
    /// Number of requests waiting for a connection
    waiting: usize,
    /// Running average acquire latency in milliseconds
    avg_acquire_ms: f64,
    acquired: u64,
    released: u64,
    queries: u64,
    errors: u64,
    timeouts: u64,
    reaped: u64,
    /// Operations the error rate is computed over
    operations: u64,
}

impl PoolStats {
    pub(crate) fn new(write: SetStats, replica: SetStats, waiting: usize, counters: &Counters) -> Self {
        let errors = counters.query_errors + counters.connection_errors;
        Self {
            write,
            replica,
            waiting,
            avg_acquire_ms: counters.acquire_latency.mean(),
            acquired: counters.acquired,
            released: counters.released,
            queries: counters.queries,
            errors,
            timeouts: counters.timeouts,
            reaped: counters.reaped,
            operations: counters.queries + counters.connection_errors,
        }
    }

    /// Get the write-set counts
    pub fn write(&self) -> SetStats {
        self.write
    }

    /// Get the replica-set counts
    pub fn replica(&self) -> SetStats {
        self.replica
    }

    /// Get the total number of connections across both sets
    pub fn total(&self) -> usize {
        self.write.total + self.replica.total
    }

    /// Get the number of active (in-use) connections across both sets
    pub fn active(&self) -> usize {
        self.write.active + self.replica.active
    }

    /// Get the number of idle connections across both sets
    pub fn idle(&self) -> usize {
        self.write.idle + self.replica.idle
    }

    /// Get the number of waiting requests
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Get the running average acquire latency
    pub fn avg_acquire_latency(&self) -> Duration {
        Duration::from_secs_f64(self.avg_acquire_ms.max(0.0) / 1000.0)
    }

    /// Get the number of successful acquisitions
    pub fn acquired(&self) -> u64 {
        self.acquired
    }

    /// Get the number of releases
    pub fn released(&self) -> u64 {
        self.released
    }

    /// Get the number of queries run through the pool
    pub fn queries(&self) -> u64 {
        self.queries
    }

    /// Get the number of failed queries and failed connection opens
    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Get the number of acquisitions that timed out
    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    /// Get the number of connections closed by the reaper
    pub fn reaped(&self) -> u64 {
        self.reaped
    }

    /// Failed operations over attempted operations (0.0 to 1.0)
    ///
    /// An operation is a query run through the pool or a connection open
    /// that failed. Returns 0.0 before anything has run.
    pub fn error_rate(&self) -> f64 {
        if self.operations == 0 {
            0.0
        } else {
            self.errors as f64 / self.operations as f64
        }
    }

    /// Calculate write-set utilization as a percentage (0.0 to 1.0)
    ///
    /// Returns 0.0 if the write set is empty.
    pub fn utilization(&self) -> f64 {
        if self.write.total == 0 {
            0.0
        } else {
            self.write.active as f64 / self.write.total as f64
        }
    }

    /// Check if the write set is fully utilized (all connections in use)
    pub fn is_full(&self) -> bool {
        self.write.idle == 0 && self.write.total > 0
    }
}
