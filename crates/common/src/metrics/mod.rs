//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions
//! for the upload surface and the extraction pipeline.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all InvoiceFlow metrics
pub const METRICS_PREFIX: &str = "invoiceflow";

/// Histogram buckets for pipeline duration (dominated by the two
/// external AI calls, so these run into tens of seconds)
pub const PIPELINE_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
    120.0,  // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Upload metrics
    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Total invoice uploads accepted"
    );

    // Pipeline metrics
    describe_counter!(
        format!("{}_invoices_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total invoices that reached a terminal processing state"
    );

    describe_counter!(
        format!("{}_invoices_retried_total", METRICS_PREFIX),
        Unit::Count,
        "Total pipeline re-enqueues after a failed attempt"
    );

    describe_counter!(
        format!("{}_enrichment_invocations_total", METRICS_PREFIX),
        Unit::Count,
        "Total fallback enrichment calls"
    );

    describe_counter!(
        format!("{}_issue_matches_total", METRICS_PREFIX),
        Unit::Count,
        "Total invoices linked to an issue"
    );

    describe_histogram!(
        format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end extraction pipeline latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record one pipeline run
pub struct PipelineMetrics {
    start: Instant,
}

impl PipelineMetrics {
    /// Start tracking a pipeline run
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Record a terminal outcome: "completed", "failed", or "retried"
    pub fn finish(self, outcome: &str) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_invoices_processed_total", METRICS_PREFIX),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
            "outcome" => outcome.to_string()
        )
        .record(duration);
    }
}

/// Helper to record a fallback enrichment call
pub fn record_enrichment(parse_ok: bool) {
    let status = if parse_ok { "parsed" } else { "discarded" };

    counter!(
        format!("{}_enrichment_invocations_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Helper to record an issue match decision
pub fn record_match(matched: bool) {
    counter!(
        format!("{}_issue_matches_total", METRICS_PREFIX),
        "matched" => matched.to_string()
    )
    .increment(1);
}
