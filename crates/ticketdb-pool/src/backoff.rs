//! Exponential backoff for connection retries

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff strategy for connection retries.
///
/// Delays grow exponentially with each attempt, up to a configurable maximum.
/// Jitter is off by default so retry timing is predictable in tests.
///
/// # Example
///
/// ```
/// use ticketdb_pool::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(100, 30_000);
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(100));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(200));
/// assert!(backoff.calculate_delay(20) <= Duration::from_millis(30_000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffStrategy {
    /// Initial delay in milliseconds for the first retry
    initial_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential growth)
    max_ms: u64,
    /// Multiplier for exponential growth
    multiplier: f64,
    /// Whether to add up to ±25% jitter to delays
    jitter: bool,
}

impl BackoffStrategy {
    /// Create a new backoff strategy with the given initial and maximum delays.
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms: initial_ms.max(1),
            max_ms: max_ms.max(initial_ms),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Set the multiplier for exponential growth. Values below 1.0 are clamped.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Enable jitter to spread out simultaneous retries.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay before retry number `attempt` (zero-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_ms as f64) * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_ms as f64) as u64;

        let final_ms = if self.jitter && capped_ms >= 4 {
            let jitter_range = capped_ms / 4;
            let offset = rand::thread_rng().gen_range(0..=jitter_range * 2);
            capped_ms.saturating_sub(jitter_range).saturating_add(offset)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }

    /// Get the initial delay.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    /// Get the maximum delay.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for BackoffStrategy {
    /// Default backoff: 100ms initial, 30 seconds max, 2x multiplier
    fn default() -> Self {
        Self::new(100, 30_000)
    }
}

/// How many times to retry opening a connection, and how long to wait between tries
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RetryPolicy {
    /// Attempts after the first one (0 = try once)
    retries: u32,
    backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub(crate) fn new(retries: u32, backoff: BackoffStrategy) -> Self {
        Self { retries, backoff }
    }

    /// Total number of attempts, including the first
    pub(crate) fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay to sleep after failed attempt number `attempt` (zero-based)
    pub(crate) fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.calculate_delay(attempt)
    }
}
