//! Health status classification
//!
//! Classifies pool health from round-trip latency and error rate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health status of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Round trips are fast and errors are rare
    Healthy,
    /// Working, but latency or error rate is elevated
    Degraded,
    /// Very slow, failing, or unreachable
    Unhealthy,
}

impl HealthStatus {
    /// Classify from a measured round trip and the pool error rate.
    ///
    /// Unhealthy wins over degraded; both limits are exclusive, so a latency
    /// exactly at a threshold stays in the better class.
    pub fn classify(latency: Duration, error_rate: f64, thresholds: &HealthThresholds) -> Self {
        if latency > thresholds.unhealthy_latency() || error_rate > thresholds.unhealthy_error_rate
        {
            HealthStatus::Unhealthy
        } else if latency > thresholds.degraded_latency()
            || error_rate > thresholds.degraded_error_rate
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Check if status indicates the pool is usable.
    ///
    /// Both `Healthy` and `Degraded` are considered usable.
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    /// Check if status is healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Healthy
    }
}

/// Thresholds for health status classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Latency in ms above which the pool is degraded
    pub degraded_latency_ms: u64,
    /// Latency in ms above which the pool is unhealthy
    pub unhealthy_latency_ms: u64,
    /// Error rate (0.0 - 1.0) above which the pool is degraded
    pub degraded_error_rate: f64,
    /// Error rate (0.0 - 1.0) above which the pool is unhealthy
    pub unhealthy_error_rate: f64,
}

impl HealthThresholds {
    /// Create new latency thresholds, keeping the default error-rate limits.
    ///
    /// # Arguments
    ///
    /// * `degraded_ms` - Latency in ms above which the pool is degraded
    /// * `unhealthy_ms` - Latency in ms above which the pool is unhealthy
    pub fn new(degraded_ms: u64, unhealthy_ms: u64) -> Self {
        Self {
            degraded_latency_ms: degraded_ms,
            unhealthy_latency_ms: unhealthy_ms.max(degraded_ms),
            ..Self::default()
        }
    }

    /// Set the error-rate limits
    pub fn with_error_rates(mut self, degraded: f64, unhealthy: f64) -> Self {
        self.degraded_error_rate = degraded;
        self.unhealthy_error_rate = unhealthy.max(degraded);
        self
    }

    /// Get the degraded latency threshold as a Duration
    pub fn degraded_latency(&self) -> Duration {
        Duration::from_millis(self.degraded_latency_ms)
    }

    /// Get the unhealthy latency threshold as a Duration
    pub fn unhealthy_latency(&self) -> Duration {
        Duration::from_millis(self.unhealthy_latency_ms)
    }
}

impl Default for HealthThresholds {
    /// Default thresholds: degraded above 500ms or 5% errors,
    /// unhealthy above 1000ms or 10% errors
    fn default() -> Self {
        Self {
            degraded_latency_ms: 500,
            unhealthy_latency_ms: 1000,
            degraded_error_rate: 0.05,
            unhealthy_error_rate: 0.10,
        }
    }
}
