//! Prometheus metrics for the tag index server.
//!
//! Counters cover tag traffic, the read-through cache, backend downloads and
//! the replication queue. Request latency is recorded per matched route.
//!
//! The `/metrics` endpoint is unauthenticated; restrict it at the network
//! level to the Prometheus scrapers.

use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};
use std::time::Instant;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Tag traffic
pub static TAG_PUTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("tagindex_tag_puts_total", "Total number of tags written")
        .expect("metric creation failed")
});

pub static TAG_GETS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("tagindex_tag_gets_total", "Total number of tag lookups")
        .expect("metric creation failed")
});

pub static CACHE_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tagindex_cache_hits_total",
        "Tag lookups answered from the in-memory cache",
    )
    .expect("metric creation failed")
});

pub static CACHE_MISSES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tagindex_cache_misses_total",
        "Tag lookups that missed the in-memory cache",
    )
    .expect("metric creation failed")
});

// Backend traffic
pub static BACKEND_DOWNLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tagindex_backend_downloads_total",
            "Tag downloads issued to storage backends",
        ),
        &["backend"],
    )
    .expect("metric creation failed")
});

pub static BACKEND_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tagindex_backend_errors_total",
            "Storage backend failures by operation (not-found excluded)",
        ),
        &["backend", "operation"],
    )
    .expect("metric creation failed")
});

// Replication
pub static REPLICATION_TASKS_ADDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tagindex_replication_tasks_added_total",
        "Replication tasks accepted by the queue",
    )
    .expect("metric creation failed")
});

pub static REPLICATION_TASKS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tagindex_replication_tasks_deduplicated_total",
        "Replication tasks dropped because an equal task was pending",
    )
    .expect("metric creation failed")
});

pub static REPLICATION_TASKS_SUCCEEDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tagindex_replication_tasks_succeeded_total",
        "Replication tasks delivered",
    )
    .expect("metric creation failed")
});

pub static REPLICATION_TASKS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tagindex_replication_tasks_failed_total",
        "Replication tasks that exhausted their retries",
    )
    .expect("metric creation failed")
});

pub static REPLICATION_TASK_RETRIES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tagindex_replication_task_retries_total",
        "Failed replication attempts that were rescheduled",
    )
    .expect("metric creation failed")
});

pub static REPLICATION_TASKS_PENDING: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "tagindex_replication_tasks_pending",
        "Replication tasks accepted and not yet finished",
    )
    .expect("metric creation failed")
});

pub static DUPLICATE_REPLICATE_CALLS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tagindex_duplicate_replicate_calls_total",
        "Duplicate-replicate calls sent to local replicas",
    )
    .expect("metric creation failed")
});

pub static DUPLICATE_REPLICATE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tagindex_duplicate_replicate_failures_total",
        "Duplicate-replicate calls to local replicas that failed",
    )
    .expect("metric creation failed")
});

// Timing
pub static REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tagindex_request_duration_seconds",
            "HTTP request latency by route and status",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "route", "status"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests can build as many routers as they like.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(TAG_PUTS.clone()),
            Box::new(TAG_GETS.clone()),
            Box::new(CACHE_HITS.clone()),
            Box::new(CACHE_MISSES.clone()),
            Box::new(BACKEND_DOWNLOADS.clone()),
            Box::new(BACKEND_ERRORS.clone()),
            Box::new(REPLICATION_TASKS_ADDED.clone()),
            Box::new(REPLICATION_TASKS_DEDUPLICATED.clone()),
            Box::new(REPLICATION_TASKS_SUCCEEDED.clone()),
            Box::new(REPLICATION_TASKS_FAILED.clone()),
            Box::new(REPLICATION_TASK_RETRIES.clone()),
            Box::new(REPLICATION_TASKS_PENDING.clone()),
            Box::new(DUPLICATE_REPLICATE_CALLS.clone()),
            Box::new(DUPLICATE_REPLICATE_FAILURES.clone()),
            Box::new(REQUEST_DURATION.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Middleware recording [`REQUEST_DURATION`].
///
/// Uses the matched route template, so tags never become label values.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = req.method().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    REQUEST_DURATION
        .with_label_values(&[method.as_str(), route.as_str(), response.status().as_str()])
        .observe(start.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
        TAG_PUTS.inc();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("tagindex_tag_puts_total"));
    }
}
