use std::time::Duration;

use serde::Serialize;

use super::{HealthStatus, HealthThresholds};
use crate::stats::PoolStats;

/// Outcome of [`Pool::health_check`](crate::Pool::health_check)
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall verdict
    pub status: HealthStatus,
    /// Round-trip latency in milliseconds, when the round trip completed
    pub latency_ms: Option<u64>,
    /// Cumulative error rate at the time of the check
    pub error_rate: f64,
    /// Why the check failed, when it did
    pub error: Option<String>,
    /// Pool statistics at the time of the check
    pub stats: PoolStats,
}

impl HealthReport {
    pub(crate) fn measured(latency: Duration, stats: PoolStats, thresholds: &HealthThresholds) -> Self {
        let error_rate = stats.error_rate();
        Self {
            status: HealthStatus::classify(latency, error_rate, thresholds),
            latency_ms: Some(latency.as_millis() as u64),
            error_rate,
            error: None,
            stats,
        }
    }

    pub(crate) fn failed(error: impl ToString, stats: PoolStats) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error_rate: stats.error_rate(),
            error: Some(error.to_string()),
            stats,
        }
    }

    /// Round-trip latency, when the round trip completed
    pub fn latency(&self) -> Option<Duration> {
        self.latency_ms.map(Duration::from_millis)
    }
}
