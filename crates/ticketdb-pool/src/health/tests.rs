//! Tests for the health module

use super::*;
use crate::stats::PoolStats;
use std::time::Duration;

mod status_tests {
    use super::*;

    fn classify(latency_ms: u64, error_rate: f64) -> HealthStatus {
        HealthStatus::classify(
            Duration::from_millis(latency_ms),
            error_rate,
            &HealthThresholds::default(),
        )
    }

    #[test]
    fn test_health_status_healthy() {
        let status = classify(50, 0.0);
        assert_eq!(status, HealthStatus::Healthy);
        assert!(status.is_healthy());
        assert!(status.is_usable());
    }

    #[test]
    fn test_health_status_degraded_by_latency() {
        let status = classify(600, 0.0);
        assert_eq!(status, HealthStatus::Degraded);
        assert!(!status.is_healthy());
        assert!(status.is_usable());
    }

    #[test]
    fn test_health_status_unhealthy_by_latency() {
        let status = classify(1200, 0.0);
        assert_eq!(status, HealthStatus::Unhealthy);
        assert!(!status.is_healthy());
        assert!(!status.is_usable());
    }

    #[test]
    fn test_health_status_by_error_rate() {
        assert_eq!(classify(10, 0.05), HealthStatus::Healthy);
        assert_eq!(classify(10, 0.06), HealthStatus::Degraded);
        assert_eq!(classify(10, 0.10), HealthStatus::Degraded);
        assert_eq!(classify(10, 0.11), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_status_at_threshold_boundary() {
        // Exactly at a threshold stays in the better class
        assert_eq!(classify(500, 0.0), HealthStatus::Healthy);
        assert_eq!(classify(501, 0.0), HealthStatus::Degraded);
        assert_eq!(classify(1000, 0.0), HealthStatus::Degraded);
        assert_eq!(classify(1001, 0.0), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_status_worst_signal_wins() {
        assert_eq!(classify(600, 0.5), HealthStatus::Unhealthy);
        assert_eq!(classify(1500, 0.0), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_status_custom_thresholds() {
        let thresholds = HealthThresholds::new(50, 200).with_error_rates(0.01, 0.02);

        let status = HealthStatus::classify(Duration::from_millis(30), 0.0, &thresholds);
        assert_eq!(status, HealthStatus::Healthy);

        let status = HealthStatus::classify(Duration::from_millis(100), 0.0, &thresholds);
        assert_eq!(status, HealthStatus::Degraded);

        let status = HealthStatus::classify(Duration::from_millis(30), 0.03, &thresholds);
        assert_eq!(status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_status_serialization() {
        let json = serde_json::to_string(&HealthStatus::Healthy).unwrap();
        assert_eq!(json, "\"healthy\"");

        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");

        let json = serde_json::to_string(&HealthStatus::Unhealthy).unwrap();
        assert_eq!(json, "\"unhealthy\"");
    }

    #[test]
    fn test_health_status_default() {
        assert_eq!(HealthStatus::default(), HealthStatus::Healthy);
    }
}

mod threshold_tests {
    use super::*;

    #[test]
    fn test_health_thresholds_default() {
        let thresholds = HealthThresholds::default();
        assert_eq!(thresholds.degraded_latency(), Duration::from_millis(500));
        assert_eq!(thresholds.unhealthy_latency(), Duration::from_millis(1000));
        assert_eq!(thresholds.degraded_error_rate, 0.05);
        assert_eq!(thresholds.unhealthy_error_rate, 0.10);
    }

    #[test]
    fn test_health_thresholds_unhealthy_not_below_degraded() {
        let thresholds = HealthThresholds::new(500, 100);
        assert_eq!(thresholds.unhealthy_latency(), Duration::from_millis(500));
    }

    #[test]
    fn test_health_thresholds_partial_json() {
        let thresholds: HealthThresholds =
            serde_json::from_str(r#"{"degraded_latency_ms": 250}"#).unwrap();
        assert_eq!(thresholds.degraded_latency(), Duration::from_millis(250));
        assert_eq!(thresholds.unhealthy_latency(), Duration::from_millis(1000));
    }
}

mod report_tests {
    use super::*;

    #[test]
    fn test_report_measured() {
        let report = HealthReport::measured(
            Duration::from_millis(600),
            PoolStats::default(),
            &HealthThresholds::default(),
        );
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.latency(), Some(Duration::from_millis(600)));
        assert!(report.error.is_none());
    }

    #[test]
    fn test_report_failed_is_unhealthy() {
        let report = HealthReport::failed("connection refused", PoolStats::default());
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.latency_ms, None);
        assert_eq!(report.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_report_serializes_status() {
        let report = HealthReport::failed("down", PoolStats::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["error"], "down");
    }
}
