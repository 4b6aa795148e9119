//! Metrics and observability utilities
//!
//! Prometheus metrics with a shared prefix. Recording goes through the
//! `record_*` helpers so label sets stay consistent between call sites.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all kgfusion metrics
pub const METRICS_PREFIX: &str = "kgfusion";

/// Histogram buckets for end-to-end retrieval latency (in seconds)
///
/// A retrieval pass fans out to several LLM calls, so the range is wide.
pub const RETRIEVAL_BUCKETS: &[f64] = &[
    0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 20.00, 30.00, 60.00, 120.0,
];

/// Buckets for single upstream calls (embedding, LLM, graph query)
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Retrieval metrics
    describe_counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        Unit::Count,
        "Total retrieval passes by outcome"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval pass latency in seconds"
    );

    describe_gauge!(
        format!("{}_seed_count", METRICS_PREFIX),
        Unit::Count,
        "Seed entities resolved for the last query"
    );

    describe_counter!(
        format!("{}_candidates_total", METRICS_PREFIX),
        Unit::Count,
        "Candidate subgraphs by strategy and outcome"
    );

    describe_counter!(
        format!("{}_evaluations_total", METRICS_PREFIX),
        Unit::Count,
        "Candidate evaluations by outcome"
    );

    describe_gauge!(
        format!("{}_fusion_best_score", METRICS_PREFIX),
        Unit::Count,
        "Score of the most recently selected subgraph"
    );

    describe_counter!(
        format!("{}_projection_cleanups_total", METRICS_PREFIX),
        Unit::Count,
        "Graph projection drops by outcome"
    );

    // Upstream metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model requests by purpose"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model latency in seconds"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a finished retrieval pass
pub fn record_retrieval(duration_secs: f64, seed_count: usize, outcome: &str) {
    counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    gauge!(format!("{}_seed_count", METRICS_PREFIX)).set(seed_count as f64);
}

/// Record one builder strategy result (`built`, `empty` or `failed`)
pub fn record_candidate(strategy: &str, outcome: &str) {
    counter!(
        format!("{}_candidates_total", METRICS_PREFIX),
        "strategy" => strategy.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one evaluator call (`scored` or `failed`)
pub fn record_evaluation(outcome: &str) {
    counter!(
        format!("{}_evaluations_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record the score of the selected subgraph
pub fn record_fusion_winner(score: f64, strategy: &str) {
    gauge!(
        format!("{}_fusion_best_score", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .set(score);
}

/// Record a projection drop attempt
pub fn record_projection_cleanup(success: bool) {
    let outcome = if success { "dropped" } else { "failed" };
    counter!(
        format!("{}_projection_cleanups_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string(),
            "batch" => if batch_size > 1 { "multi" } else { "single" }
        )
        .record(duration_secs);
    }
}

/// Record a language model call; `purpose` is `seeds`, `evaluate` or `answer`
pub fn record_llm(duration_secs: f64, purpose: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "purpose" => purpose.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        "purpose" => purpose.to_string()
    )
    .record(duration_secs);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    let name = if hit { "cache_hits_total" } else { "cache_misses_total" };
    counter!(
        format!("{}_{}", METRICS_PREFIX, name),
        "cache" => cache_name.to_string()
    )
    .increment(1);
}
