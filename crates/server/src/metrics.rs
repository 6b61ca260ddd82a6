//! Prometheus metrics.
//!
//! Registration is idempotent so tests can build multiple servers in one
//! process.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, TextEncoder};

pub static UPLOADS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("granary_uploads_total", "Artifacts ingested").expect("valid metric")
});

pub static UPLOADS_DEDUPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "granary_uploads_deduplicated_total",
        "Uploads whose blob write was short-circuited by dedup",
    )
    .expect("valid metric")
});

pub static RECORDS_SUPERSEDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "granary_records_superseded_total",
        "Records replaced by a newer canonical upload",
    )
    .expect("valid metric")
});

pub static BLOBS_DELETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "granary_blobs_deleted_total",
        "Unreferenced blobs garbage-collected",
    )
    .expect("valid metric")
});

/// Register all metrics with the default registry.
pub fn register_metrics() {
    for metric in [
        &*UPLOADS_TOTAL,
        &*UPLOADS_DEDUPED,
        &*RECORDS_SUPERSEDED,
        &*BLOBS_DELETED,
    ] {
        // AlreadyRegistered is fine: a second AppState in the same process.
        let _ = prometheus::default_registry().register(Box::new(metric.clone()));
    }
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (
        StatusCode::OK,
        String::from_utf8_lossy(&buffer).into_owned(),
    )
}
