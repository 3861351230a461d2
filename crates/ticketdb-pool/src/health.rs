//! Health classification for the pool
//!
//! A health check runs one trivial round trip on a write connection and
//! combines its latency with the pool's cumulative error rate.
//!
//! # Example
//!
//! ```
//! use ticketdb_pool::{HealthStatus, HealthThresholds};
//! use std::time::Duration;
//!
//! let thresholds = HealthThresholds::default();
//! let status = HealthStatus::classify(Duration::from_millis(50), 0.0, &thresholds);
//! assert_eq!(status, HealthStatus::Healthy);
//!
//! let status = HealthStatus::classify(Duration::from_millis(50), 0.2, &thresholds);
//! assert_eq!(status, HealthStatus::Unhealthy);
//! ```

mod report;
mod status;

#[cfg(test)]
mod tests;

pub use report::HealthReport;
pub use status::{HealthStatus, HealthThresholds};

/// Round-trip statement used by the health check
pub(crate) const PING_QUERY: &str = "SELECT 1";
