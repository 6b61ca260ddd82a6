//! Blob bookkeeping repository.

use crate::error::MetadataResult;
use crate::models::BlobRow;
use async_trait::async_trait;

/// Repository for blob bookkeeping.
///
/// The blob does not know its referrers; reference counting is computed
/// against record queries by callers.
#[async_trait]
pub trait BlobRepo: Send + Sync {
    /// Insert a blob row; a no-op if the key already exists (dedup).
    /// Returns whether a new row was created.
    async fn insert_blob(&self, blob: &BlobRow) -> MetadataResult<bool>;

    /// Get a blob row by key.
    async fn get_blob(&self, key: &str) -> MetadataResult<Option<BlobRow>>;

    /// Delete a blob row by key.
    async fn delete_blob(&self, key: &str) -> MetadataResult<()>;

    /// List blob rows no record references, up to `limit`.
    async fn list_unreferenced_blobs(&self, limit: u32) -> MetadataResult<Vec<BlobRow>>;
}
