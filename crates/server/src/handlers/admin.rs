//! Admin and operational handlers.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use serde_json::{Value, json};

/// GET /health - Liveness probe.
///
/// Intentionally unauthenticated for load balancers and probes.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.metadata.health_check().await?;
    state.blobs.inner().health_check().await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Result of a GC sweep.
#[derive(Debug, Serialize)]
pub struct SweepResult {
    pub deleted: u64,
}

/// POST /admin/gc - Reclaim blobs no record references.
///
/// Inline reclamation already runs on every supersede and delete; the sweep
/// mops up anything left behind by failed cleanup.
#[tracing::instrument(skip(state))]
pub async fn gc_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepResult>> {
    let batch_size = state.config.gc.sweep_batch_size;
    let deleted = state.ingest.sweep_unreferenced(batch_size).await?;
    tracing::info!(deleted, "gc sweep finished");
    Ok(Json(SweepResult { deleted }))
}
