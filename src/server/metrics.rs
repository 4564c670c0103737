use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all notification server metrics
const PREFIX: &str = "notification_server";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Matching Metrics
    pub static ref NOTIFICATIONS_PUBLISHED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_notifications_published_total"),
        "Notification events published by the keyword matcher"
    ).expect("Failed to create notifications_published_total metric");

    // Live Delivery Metrics
    pub static ref LIVE_CONNECTIONS: Gauge = Gauge::new(
        format!("{PREFIX}_live_connections"),
        "Number of open live connections"
    ).expect("Failed to create live_connections metric");

    pub static ref BROADCAST_PUSHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_broadcast_pushes_total"), "Pushes to live connections by result"),
        &["result"]
    ).expect("Failed to create broadcast_pushes_total metric");

    // Persistence Metrics
    pub static ref FLUSH_BATCHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_flush_batches_total"), "Write-back flush batches by outcome"),
        &["outcome"]
    ).expect("Failed to create flush_batches_total metric");

    pub static ref FLUSHED_ROWS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_flushed_rows_total"),
        "Notification rows written by the write-back buffer"
    ).expect("Failed to create flushed_rows_total metric");

    // Stream Consumption Metrics
    pub static ref CONSUMER_RETRIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_consumer_retries_total"), "Record processing retries"),
        &["topic"]
    ).expect("Failed to create consumer_retries_total metric");

    pub static ref DEAD_LETTERS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_dead_letters_total"), "Records moved to a dead-letter topic"),
        &["topic"]
    ).expect("Failed to create dead_letters_total metric");

    pub static ref STREAM_RECORDS_PRUNED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_stream_records_pruned_total"),
        "Stream records removed by retention pruning"
    ).expect("Failed to create stream_records_pruned_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_PUBLISHED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(LIVE_CONNECTIONS.clone()));
    let _ = REGISTRY.register(Box::new(BROADCAST_PUSHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FLUSH_BATCHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FLUSHED_ROWS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CONSUMER_RETRIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DEAD_LETTERS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(STREAM_RECORDS_PRUNED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Map a request path to a bounded label value.
pub fn categorize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "info",
        "/api/notifications/subscribe" => "subscribe",
        "/api/notifications" => "history",
        "/api/notifications/unread-count" => "unread_count",
        "/internal/contents" => "ingest",
        p if p.starts_with("/api/notifications/") && p.ends_with("/read") => "mark_read",
        _ => "other",
    }
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let endpoint = categorize_endpoint(path);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

pub fn record_notification_published() {
    NOTIFICATIONS_PUBLISHED_TOTAL.inc();
}

pub fn record_broadcast(delivered: usize, failed: usize) {
    if delivered > 0 {
        BROADCAST_PUSHES_TOTAL
            .with_label_values(&["delivered"])
            .inc_by(delivered as f64);
    }
    if failed > 0 {
        BROADCAST_PUSHES_TOTAL
            .with_label_values(&["failed"])
            .inc_by(failed as f64);
    }
}

/// Record one flush batch. `rows` is the number of rows actually written.
pub fn record_flush(outcome: &str, rows: usize) {
    FLUSH_BATCHES_TOTAL.with_label_values(&[outcome]).inc();
    FLUSHED_ROWS_TOTAL.inc_by(rows as f64);
}

pub fn record_consumer_retry(topic: &str) {
    CONSUMER_RETRIES_TOTAL.with_label_values(&[topic]).inc();
}

pub fn record_dead_letter(topic: &str) {
    DEAD_LETTERS_TOTAL.with_label_values(&[topic]).inc();
}

pub fn record_stream_pruned(count: usize) {
    STREAM_RECORDS_PRUNED_TOTAL.inc_by(count as f64);
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // RSS is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
