//! Blob read handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use granary_core::digest::ContentKey;

/// GET /blobs/{key} - Stream stored artifact bytes.
///
/// This is the read API downstream consumers (CDN, snapshot export) use;
/// the key is the content digest, so responses are immutable and
/// indefinitely cacheable.
pub async fn get_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    let parsed = ContentKey::parse(&key).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let row = state
        .metadata
        .get_blob(&parsed.to_hex())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("blob {key}")))?;

    let stream = state.blobs.get_stream(&parsed).await?;
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_LENGTH, row.length.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", row.filename),
        ),
        (
            header::CACHE_CONTROL,
            "public, max-age=31536000, immutable".to_string(),
        ),
    ];
    Ok((headers, Body::from_stream(stream)).into_response())
}
