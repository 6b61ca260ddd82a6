//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("canonical key conflict: {0}")]
    Consistency(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] granary_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] granary_metadata::MetadataError),

    #[error(transparent)]
    Core(#[from] granary_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Consistency(_) => "consistency_error",
            Self::Internal(_) => "internal_error",
            Self::Storage(e) => match e {
                granary_storage::StorageError::NotFound(_) => "not_found",
                granary_storage::StorageError::ChecksumMismatch { .. } => "checksum_mismatch",
                _ => "storage_error",
            },
            Self::Metadata(e) => match e {
                granary_metadata::MetadataError::NotFound(_) => "not_found",
                granary_metadata::MetadataError::AlreadyExists(_) => "conflict",
                _ => "metadata_error",
            },
            Self::Core(e) => match e {
                granary_core::Error::ChecksumMismatch { .. } => "checksum_mismatch",
                granary_core::Error::ManifestMissing => "manifest_missing",
                granary_core::Error::ManifestParse(_) => "manifest_parse_error",
                granary_core::Error::Validation(_) => "validation_error",
                _ => "bad_request",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Consistency(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                granary_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                granary_storage::StorageError::ChecksumMismatch { .. } => StatusCode::BAD_REQUEST,
                granary_storage::StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                granary_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                granary_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            // Every core failure is a malformed or invalid upload.
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_mismatch_is_a_client_error() {
        let err = ApiError::Core(granary_core::Error::ChecksumMismatch {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "checksum_mismatch");
    }

    #[test]
    fn consistency_maps_to_conflict() {
        let err = ApiError::Consistency("4 records match".to_string());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_manifest_is_distinguishable() {
        let err = ApiError::Core(granary_core::Error::ManifestMissing);
        assert_eq!(err.code(), "manifest_missing");
    }
}
