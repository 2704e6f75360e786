//! Metrics and observability utilities
//!
//! Prometheus metrics for the chat and ingestion pipelines with
//! standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all AgentDesk metrics
pub const METRICS_PREFIX: &str = "agentdesk";

/// Histogram buckets for chat latency (in seconds), dominated by the model call
pub const CHAT_LATENCY_BUCKETS: &[f64] = &[
    0.250, 0.500, 1.000, 2.000, 3.000, 5.000, 8.000, 13.00, 21.00, 34.00, 60.00,
];

/// Buckets for ingestion latency
pub const INGESTION_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_chat_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat-completion requests by outcome"
    );

    describe_histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chat-completion latency in seconds"
    );

    describe_counter!(
        format!("{}_model_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Failed chat-completion API calls"
    );

    describe_histogram!(
        format!("{}_retrieval_context_chars", METRICS_PREFIX),
        Unit::Count,
        "Characters of knowledge context added to the system prompt"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks created"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Knowledge-base ingestion latency in seconds"
    );

    describe_counter!(
        format!("{}_pages_crawled_total", METRICS_PREFIX),
        Unit::Count,
        "Pages fetched by the multi-page crawler"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record chat metrics
pub struct ChatMetrics {
    start: Instant,
}

impl ChatMetrics {
    /// Start tracking a chat request
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record request completion
    pub fn finish(self, success: bool) {
        let outcome = if success { "success" } else { "error" };

        counter!(
            format!("{}_chat_requests_total", METRICS_PREFIX),
            "outcome" => outcome
        )
        .increment(1);

        histogram!(format!("{}_chat_duration_seconds", METRICS_PREFIX))
            .record(self.start.elapsed().as_secs_f64());
    }
}

/// Helper to record a failed model call
pub fn record_model_error(model: &str, status: Option<u16>) {
    let status = status.map(|s| s.to_string()).unwrap_or_else(|| "network".to_string());

    counter!(
        format!("{}_model_errors_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Helper to record retrieval metrics
pub fn record_retrieval(context_chars: usize) {
    histogram!(format!("{}_retrieval_context_chars", METRICS_PREFIX)).record(context_chars as f64);
}

/// Helper to record ingestion metrics
pub fn record_ingestion(duration_secs: f64, chunks_created: usize, source: &str) {
    counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .increment(chunks_created as u64);

    histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        "source" => source.to_string()
    )
    .record(duration_secs);
}

/// Helper to record crawler metrics
pub fn record_crawl(pages: usize) {
    counter!(format!("{}_pages_crawled_total", METRICS_PREFIX)).increment(pages as u64);
}
