//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid content key: {0}")]
    InvalidContentKey(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("archive contains no manifest")]
    ManifestMissing,

    #[error("manifest parse error: {0}")]
    ManifestParse(String),

    #[error("invalid artifact kind: {0}")]
    InvalidArtifactKind(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("archive error: {0}")]
    Archive(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
