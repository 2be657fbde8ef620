/// Metrics and telemetry for the LearnHub service
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Hosted backend request latencies
/// - Purchase saga step outcomes
/// - Email deliveries
/// - Catalog cache hit/miss rates
/// - Profile lookups that exhausted their retries

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Backend Metrics ==========

    /// Requests to the hosted backend by operation and table
    pub static ref BACKEND_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "backend_request_duration_seconds",
        "Hosted backend request latencies in seconds",
        &["operation", "table"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0]
    )
    .unwrap();

    /// Profile lookups that never found a row within the retry budget
    pub static ref PROFILE_RETRY_EXHAUSTED_TOTAL: IntCounter = register_int_counter!(
        "profile_retry_exhausted_total",
        "Profile lookups that exhausted their retry attempts"
    )
    .unwrap();

    // ========== Purchase Metrics ==========

    /// Purchase saga steps by step and outcome
    pub static ref PURCHASE_STEPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "purchase_steps_total",
        "Purchase saga step outcomes",
        &["step", "outcome"]
    )
    .unwrap();

    // ========== Email Metrics ==========

    /// Emails by template kind and status
    pub static ref EMAILS_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        "emails_sent_total",
        "Total number of transactional emails attempted",
        &["kind", "status"]
    )
    .unwrap();

    // ========== Cache Metrics ==========

    /// Cache hits by cache type
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_hits_total",
        "Total number of cache hits",
        &["cache_type"]
    )
    .unwrap();

    /// Cache misses by cache type
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_misses_total",
        "Total number of cache misses",
        &["cache_type"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a hosted backend request
pub fn record_backend_request(operation: &str, table: &str, duration: f64) {
    BACKEND_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation, table])
        .observe(duration);
}

/// Record a purchase step outcome
pub fn record_purchase_step(step: &str, outcome: &str) {
    PURCHASE_STEPS_TOTAL.with_label_values(&[step, outcome]).inc();
}

/// Record an email attempt
pub fn record_email(kind: &str, success: bool) {
    EMAILS_SENT_TOTAL
        .with_label_values(&[kind, if success { "sent" } else { "failed" }])
        .inc();
}

/// Record a cache access
pub fn record_cache_access(cache_type: &str, hit: bool) {
    if hit {
        CACHE_HITS_TOTAL.with_label_values(&[cache_type]).inc();
    } else {
        CACHE_MISSES_TOTAL.with_label_values(&[cache_type]).inc();
    }
}

/// Record a profile lookup that ran out of attempts
pub fn record_profile_retry_exhausted() {
    PROFILE_RETRY_EXHAUSTED_TOTAL.inc();
}
