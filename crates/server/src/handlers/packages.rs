//! Package record handlers.

use crate::error::{ApiError, ApiResult};
use crate::ingest::UploadRequest;
use crate::metrics::UPLOADS_TOTAL;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use bytes::Bytes;
use futures::StreamExt;
use granary_core::builder::BuilderMetadata;
use granary_core::digest::ContentKey;
use granary_core::record::PackageRecord;
use granary_core::ArtifactKind;
use granary_storage::{ByteStream, StorageError};
use serde::Deserialize;

/// Decode builder side-channel headers.
fn builder_from_headers(headers: &HeaderMap) -> BuilderMetadata {
    let pairs: Vec<(&str, &str)> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect();
    BuilderMetadata::from_headers(pairs)
}

/// Adapt the request body into a size-capped storage byte stream.
///
/// Body errors (client disconnect mid-upload) surface as storage errors,
/// which abort the streaming blob write and discard the partial object.
fn body_stream(body: Body, max_len: u64) -> ByteStream {
    let mut inner = body.into_data_stream();
    let stream = async_stream::try_stream! {
        let mut total: u64 = 0;
        while let Some(chunk) = inner.next().await {
            let chunk: Bytes = chunk
                .map_err(|e| StorageError::Backend(format!("request body: {e}")))?;
            total += chunk.len() as u64;
            if total > max_len {
                Err(StorageError::Backend(format!(
                    "artifact exceeds maximum size of {max_len} bytes"
                )))?;
            }
            yield chunk;
        }
    };
    Box::pin(stream)
}

fn parse_kind(kind: &str) -> ApiResult<ArtifactKind> {
    ArtifactKind::parse(kind).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// PUT /packages/{user}/{package}/{version}/{kind}/{key} - Ingest an artifact.
#[tracing::instrument(skip_all)]
pub async fn publish(
    State(state): State<AppState>,
    Path((user, package, version, kind, key)): Path<(String, String, String, String, String)>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Json<PackageRecord>> {
    let kind = parse_kind(&kind)?;
    if !kind.owns_blob() {
        return Err(ApiError::BadRequest(
            "failure records are posted to the failure endpoint".to_string(),
        ));
    }
    let key = ContentKey::parse(&key).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let builder = builder_from_headers(&headers);
    let filename = format!("{package}_{version}.tar.gz");

    let request = UploadRequest {
        user,
        package,
        version,
        kind,
        key,
        filename,
        builder,
    };
    let stream = body_stream(body, state.config.server.max_artifact_size);

    let record = state.ingest.ingest(request, stream).await?;
    UPLOADS_TOTAL.inc();
    Ok(Json(record))
}

/// DELETE /packages/{user}/{package}/{version}/failure - Remove a failure
/// record. The static path segment shadows `{kind}` on this route.
pub async fn delete_failure(
    State(state): State<AppState>,
    Path((user, package, version)): Path<(String, String, String)>,
) -> ApiResult<Json<PackageRecord>> {
    let record = state
        .ingest
        .remove(&user, &package, &version, ArtifactKind::Failure)
        .await?;
    Ok(Json(record))
}

/// POST /packages/{user}/{package}/{version}/failure - Record a build failure.
#[tracing::instrument(skip(state, headers))]
pub async fn record_failure(
    State(state): State<AppState>,
    Path((user, package, version)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<PackageRecord>> {
    let builder = builder_from_headers(&headers);
    let record = state
        .ingest
        .record_failure(&user, &package, &version, builder)
        .await?;
    Ok(Json(record))
}

/// GET /packages/{user}/{package} - List live records for a package.
pub async fn list_records(
    State(state): State<AppState>,
    Path((user, package)): Path<(String, String)>,
) -> ApiResult<Json<Vec<PackageRecord>>> {
    let rows = state.metadata.list_records(&user, &package).await?;
    if rows.is_empty() {
        return Err(ApiError::NotFound(format!("{user}/{package}")));
    }
    let records = rows
        .into_iter()
        .map(|row| row.into_record())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(records))
}

/// GET /packages/{user}/{package}/{version}/{kind} - Fetch one record.
pub async fn get_record(
    State(state): State<AppState>,
    Path((user, package, version, kind)): Path<(String, String, String, String)>,
) -> ApiResult<Json<PackageRecord>> {
    let kind = parse_kind(&kind)?;
    let row = state
        .metadata
        .get_record(&user, &package, &version, kind.as_str())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{user}/{package} {version} ({kind})")))?;
    Ok(Json(row.into_record()?))
}

/// DELETE /packages/{user}/{package}/{version}/{kind} - Remove a record.
#[tracing::instrument(skip(state))]
pub async fn delete_record(
    State(state): State<AppState>,
    Path((user, package, version, kind)): Path<(String, String, String, String)>,
) -> ApiResult<Json<PackageRecord>> {
    let kind = parse_kind(&kind)?;
    let record = state.ingest.remove(&user, &package, &version, kind).await?;
    Ok(Json(record))
}

/// Body for status updates.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default)]
    pub build_url: Option<String>,
}

/// POST /packages/{user}/{package}/{version}/{kind}/status - Patch
/// side-channel bookkeeping in place.
#[tracing::instrument(skip(state, update))]
pub async fn update_status(
    State(state): State<AppState>,
    Path((user, package, version, kind)): Path<(String, String, String, String)>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<PackageRecord>> {
    let kind = parse_kind(&kind)?;
    let row = state
        .metadata
        .get_record(&user, &package, &version, kind.as_str())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{user}/{package} {version} ({kind})")))?;

    state
        .metadata
        .update_status(row.id, &update.status, update.build_url.as_deref())
        .await?;

    let refreshed = state
        .metadata
        .get_record(&user, &package, &version, kind.as_str())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{user}/{package} {version} ({kind})")))?;
    Ok(Json(refreshed.into_record()?))
}
