//! Prometheus metrics for application observability.
//!
//! Metrics are exposed on a dedicated listener (default `0.0.0.0:9090`),
//! separate from the cumulative JSON counters served at `/debug/vars`.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `greenlight_http_requests_total` - Requests received (labels: method, status)
//! - `greenlight_rate_limit_rejections_total` - Requests refused by the limiter
//! - `greenlight_background_panics_total` - Background jobs that panicked (label: task)
//! - `greenlight_mail_failures_total` - Mails that exhausted their retries (label: template)
//! - `greenlight_handler_panics_total` - Request handlers that panicked
//!
//! ## Histograms
//! - `greenlight_request_duration_seconds` - Request duration (labels: method, status)
//!
//! ## Gauges
//! - `greenlight_rate_limiter_clients` - Clients currently tracked by the limiter
//!
//! # Usage
//!
//! ```rust,ignore
//! use greenlight::metrics::{init_metrics, record_request_duration};
//!
//! init_metrics("0.0.0.0:9090".parse()?)?;
//! record_request_duration("GET", "200", 0.045);
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "greenlight_http_requests_total";
    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "greenlight_rate_limit_rejections_total";
    pub const BACKGROUND_PANICS_TOTAL: &str = "greenlight_background_panics_total";
    pub const HANDLER_PANICS_TOTAL: &str = "greenlight_handler_panics_total";
    pub const MAIL_FAILURES_TOTAL: &str = "greenlight_mail_failures_total";
    pub const REQUEST_DURATION_SECONDS: &str = "greenlight_request_duration_seconds";
    pub const RATE_LIMITER_CLIENTS: &str = "greenlight_rate_limiter_clients";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Returns
///
/// `Ok(())` if initialization succeeds, `Err` with message otherwise.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::HTTP_REQUESTS_TOTAL,
        "Total number of HTTP requests handled"
    );
    describe_counter!(
        names::RATE_LIMIT_REJECTIONS_TOTAL,
        "Total number of requests rejected by the per-client rate limiter"
    );
    describe_counter!(
        names::BACKGROUND_PANICS_TOTAL,
        "Total number of background jobs that panicked"
    );
    describe_counter!(
        names::HANDLER_PANICS_TOTAL,
        "Total number of request handlers that panicked"
    );
    describe_counter!(
        names::MAIL_FAILURES_TOTAL,
        "Total number of mails that could not be delivered"
    );

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );

    describe_gauge!(
        names::RATE_LIMITER_CLIENTS,
        "Number of clients currently tracked by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

pub fn record_rate_limit_rejection() {
    counter!(names::RATE_LIMIT_REJECTIONS_TOTAL).increment(1);
}

pub fn record_background_panic(task: &'static str) {
    counter!(names::BACKGROUND_PANICS_TOTAL, "task" => task).increment(1);
}

pub fn record_handler_panic() {
    counter!(names::HANDLER_PANICS_TOTAL).increment(1);
}

pub fn record_mail_failure(template: &str) {
    counter!(names::MAIL_FAILURES_TOTAL, "template" => template.to_string()).increment(1);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

/// Record a finished HTTP request.
///
/// Labels stay low-cardinality: no path, since paths embed record ids.
pub fn record_request_duration(method: &str, status: &str, duration_secs: f64) {
    counter!(names::HTTP_REQUESTS_TOTAL, "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS, "method" => method.to_string(), "status" => status.to_string())
        .record(duration_secs);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

pub fn set_rate_limiter_clients(count: usize) {
    gauge!(names::RATE_LIMITER_CLIENTS).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed exporter is a no-op and must not panic.

    #[test]
    fn test_record_request_duration() {
        record_request_duration("POST", "201", 0.1);
    }

    #[test]
    fn test_record_counters() {
        record_rate_limit_rejection();
        record_background_panic("send_mail");
        record_handler_panic();
        record_mail_failure("user_welcome");
    }

    #[test]
    fn test_set_rate_limiter_clients() {
        set_rate_limiter_clients(0);
        set_rate_limiter_clients(12);
    }
}
