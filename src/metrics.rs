/// Metrics and telemetry for the Aura server
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Transaction outcomes and contention retries
/// - Push delivery attempts
/// - Live subscription counts
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
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

    // ========== Transaction Metrics ==========

    /// Transactions by operation and outcome (committed, aborted, exhausted)
    pub static ref TRANSACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "transactions_total",
        "Total number of finished transactions",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Retries caused by write contention
    pub static ref TRANSACTION_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "transaction_retries_total",
        "Total number of transaction attempts retried after contention",
        &["operation"]
    )
    .unwrap();

    // ========== Notification Metrics ==========

    /// Notifications created by kind
    pub static ref NOTIFICATIONS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "notifications_created_total",
        "Total number of notifications created",
        &["kind"]
    )
    .unwrap();

    /// Push attempts by notification kind and outcome
    pub static ref PUSH_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "push_attempts_total",
        "Total number of push dispatches",
        &["kind", "outcome"]
    )
    .unwrap();

    // ========== Live Subscription Metrics ==========

    /// Open live subscriptions
    pub static ref LIVE_SUBSCRIPTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "live_subscriptions_active",
        "Number of live subscriptions currently open"
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    // ========== Media Metrics ==========

    /// Media uploads by kind
    pub static ref MEDIA_UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "media_uploads_total",
        "Total number of media uploads",
        &["kind"]
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

/// Record a finished transaction
pub fn record_transaction(operation: &str, outcome: &str) {
    TRANSACTIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Record a contention retry
pub fn record_transaction_retry(operation: &str) {
    TRANSACTION_RETRIES_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Record a created notification
pub fn record_notification_created(kind: &str) {
    NOTIFICATIONS_CREATED_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a push dispatch
pub fn record_push_attempt(kind: &str, outcome: &str) {
    PUSH_ATTEMPTS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
}

/// Record a media upload
pub fn record_media_upload(kind: &str) {
    MEDIA_UPLOADS_TOTAL.with_label_values(&[kind]).inc();
}
