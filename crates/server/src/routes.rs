//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Health check (intentionally unauthenticated for probes)
        .route("/health", get(handlers::health_check))
        // Ingestion
        .route(
            "/packages/{user}/{package}/{version}/{kind}/{key}",
            put(handlers::publish),
        )
        .route(
            "/packages/{user}/{package}/{version}/failure",
            post(handlers::record_failure).delete(handlers::delete_failure),
        )
        .route(
            "/packages/{user}/{package}/{version}/{kind}/status",
            post(handlers::update_status),
        )
        // Record read/delete API
        .route("/packages/{user}/{package}", get(handlers::list_records))
        .route(
            "/packages/{user}/{package}/{version}/{kind}",
            get(handlers::get_record).delete(handlers::delete_record),
        )
        // Blob read API
        .route("/blobs/{key}", get(handlers::get_blob))
        // Admin
        .route("/admin/gc", post(handlers::gc_sweep));

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
