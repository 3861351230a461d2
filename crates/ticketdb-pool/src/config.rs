//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::{BackoffStrategy, RetryPolicy};
use crate::error::{PoolError, PoolResult};
use crate::health::HealthThresholds;

/// Upper bound for the delay between connection attempts
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Configuration for a connection pool
///
/// Supplied once when the pool is created. Sizes apply to the write set;
/// replica connections are opened one per entry in `replicas`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of write connections
    max_connections: usize,
    /// Minimum number of write connections kept open
    min_connections: usize,
    /// Timeout in milliseconds when waiting for a connection
    acquire_timeout_ms: u64,
    /// Idle time in milliseconds after which a write connection may be reaped
    idle_timeout_ms: u64,
    /// Interval in milliseconds between reaper cycles
    reap_interval_ms: u64,
    /// Route reads to replica connections when one is idle
    enable_read_replicas: bool,
    /// Replica targets, passed verbatim to the connection factory
    replicas: Vec<String>,
    /// Extra attempts after a failed connection open
    retry_attempts: u32,
    /// Delay in milliseconds before the first retry (doubles per attempt)
    retry_delay_ms: u64,
    /// Thresholds used by the health check
    health: HealthThresholds,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    ///
    /// Other settings keep their defaults. Sizes are checked by
    /// [`PoolConfig::validate`] when the pool starts.
    pub fn new(min_connections: usize, max_connections: usize) -> Self {
        Self {
            min_connections,
            max_connections,
            ..Self::default()
        }
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the idle timeout in milliseconds
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    /// Set the reaper interval in milliseconds
    pub fn with_reap_interval_ms(mut self, interval_ms: u64) -> Self {
        self.reap_interval_ms = interval_ms;
        self
    }

    /// Enable read replicas with the given targets
    pub fn with_read_replicas<I, S>(mut self, replicas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enable_read_replicas = true;
        self.replicas = replicas.into_iter().map(Into::into).collect();
        self
    }

    /// Set retry attempts and the initial retry delay for opening connections
    pub fn with_retry(mut self, attempts: u32, delay_ms: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Set custom health thresholds
    pub fn with_health_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.health = thresholds;
        self
    }

    /// Get the maximum number of write connections
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Get the minimum number of write connections
    pub fn min_connections(&self) -> usize {
        self.min_connections
    }

    /// Get the acquire timeout as a Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Get the idle timeout as a Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Get the reaper interval as a Duration
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    /// Check whether read replicas are in use
    pub fn read_replicas_enabled(&self) -> bool {
        self.enable_read_replicas
    }

    /// Get the replica targets
    pub fn replicas(&self) -> &[String] {
        &self.replicas
    }

    /// Get the number of extra connection attempts
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Get the initial retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Get the health thresholds
    pub fn health_thresholds(&self) -> &HealthThresholds {
        &self.health
    }

    /// Retry policy for opening connections
    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            BackoffStrategy::new(self.retry_delay_ms, MAX_RETRY_DELAY_MS),
        )
    }

    /// Check the configuration for values the pool cannot run with
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Configuration(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.reap_interval_ms == 0 {
            return Err(PoolError::Configuration(
                "reap_interval_ms must be greater than 0".into(),
            ));
        }
        if self.enable_read_replicas && self.replicas.is_empty() {
            return Err(PoolError::Configuration(
                "read replicas are enabled but no replica targets are configured".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - max_connections: 20
    /// - min_connections: 5
    /// - acquire_timeout: 30 seconds
    /// - idle_timeout: 5 minutes
    /// - reap_interval: 1 minute
    /// - read replicas: disabled
    /// - retry: 3 attempts, 1 second initial delay
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 5,
            acquire_timeout_ms: 30_000,
            idle_timeout_ms: 300_000,
            reap_interval_ms: 60_000,
            enable_read_replicas: false,
            replicas: Vec::new(),
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            health: HealthThresholds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections(), 20);
        assert_eq!(config.min_connections(), 5);
        assert_eq!(config.acquire_timeout(), Duration::from_millis(30_000));
        assert_eq!(config.idle_timeout(), Duration::from_millis(300_000));
        assert_eq!(config.reap_interval(), Duration::from_millis(60_000));
        assert!(!config.read_replicas_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pool_config_builders() {
        let config = PoolConfig::new(1, 2)
            .with_acquire_timeout_ms(50)
            .with_idle_timeout_ms(100)
            .with_reap_interval_ms(25)
            .with_read_replicas(["replica-a", "replica-b"])
            .with_retry(2, 10);

        assert_eq!(config.acquire_timeout(), Duration::from_millis(50));
        assert_eq!(config.idle_timeout(), Duration::from_millis(100));
        assert_eq!(config.reap_interval(), Duration::from_millis(25));
        assert!(config.read_replicas_enabled());
        assert_eq!(config.replicas(), ["replica-a", "replica-b"]);
        assert_eq!(config.retry_attempts(), 2);
        assert_eq!(config.retry_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_pool_config_rejects_zero_max() {
        let err = PoolConfig::new(0, 0).validate().unwrap_err();
        assert!(err.to_string().contains("max_connections must be greater than 0"));
    }

    #[test]
    fn test_pool_config_rejects_min_above_max() {
        let err = PoolConfig::new(10, 5).validate().unwrap_err();
        assert!(
            err.to_string()
                .contains("min_connections (10) cannot exceed max_connections (5)")
        );
    }

    #[test]
    fn test_pool_config_rejects_replicas_without_targets() {
        let config = PoolConfig::new(1, 2).with_read_replicas(Vec::<String>::new());
        assert!(matches!(
            config.validate(),
            Err(PoolError::Configuration(_))
        ));
    }

    #[test]
    fn test_pool_config_serialization() {
        let config = PoolConfig::new(2, 10)
            .with_acquire_timeout_ms(5000)
            .with_read_replicas(["reports-replica"]);

        let json = serde_json::to_string(&config).expect("serialize");
        let deserialized: PoolConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_pool_config_partial_json_uses_defaults() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"max_connections": 4, "min_connections": 1}"#)
                .expect("deserialize");
        assert_eq!(config.max_connections(), 4);
        assert_eq!(config.acquire_timeout(), Duration::from_millis(30_000));
        assert_eq!(config.retry_attempts(), 3);
    }
}
