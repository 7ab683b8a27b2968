//! Prometheus metrics for the atelier gateway.
//!
//! Exposes admission decisions, generation outcomes, provider latency and
//! admission ledger size.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no prompts or client addresses, but they do expose aggregate
//! usage. Restrict `/metrics` to the scraper at the network level, or disable
//! it with `server.metrics_enabled = false`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Admission metrics
pub static ADMISSION_DECISIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "atelier_admission_decisions_total",
            "Admission decisions by outcome (allowed, privileged or deny code)",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

// Generation metrics
pub static GENERATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "atelier_generations_total",
            "Recorded generation attempts by status",
        ),
        &["status"],
    )
    .expect("metric creation failed")
});

pub static IMAGE_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "atelier_image_bytes_total",
        "Total bytes of generated images stored",
    )
    .expect("metric creation failed")
});

pub static PROVIDER_LATENCY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "atelier_provider_request_duration_seconds",
            "Time taken by the image provider to answer a generation request",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

// Ledger metrics
pub static LEDGER_CLIENTS_EVICTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "atelier_ledger_clients_evicted_total",
        "Total number of idle clients evicted from the admission ledger",
    )
    .expect("metric creation failed")
});

pub static LEDGER_TRACKED_CLIENTS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "atelier_ledger_tracked_clients",
        "Current number of clients tracked by the admission ledger",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build several routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(ADMISSION_DECISIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GENERATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMAGE_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROVIDER_LATENCY.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LEDGER_CLIENTS_EVICTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LEDGER_TRACKED_CLIENTS.clone()))
            .expect("metric registration failed");
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
