//! Package record repository.

use crate::error::MetadataResult;
use crate::models::RecordRow;
use async_trait::async_trait;
use granary_core::CanonicalKey;
use uuid::Uuid;

/// Repository for package record operations.
///
/// Single-row operations are the unit of consistency; there are no
/// multi-row transactions spanning records and blobs.
#[async_trait]
pub trait RecordRepo: Send + Sync {
    /// Insert a record.
    async fn insert_record(&self, record: &RecordRow) -> MetadataResult<()>;

    /// Get one record by identifying fields. When several platform slices
    /// match, the most recently created wins.
    async fn get_record(
        &self,
        publisher: &str,
        package: &str,
        version: &str,
        kind: &str,
    ) -> MetadataResult<Option<RecordRow>>;

    /// List all live records for a package.
    async fn list_records(&self, publisher: &str, package: &str) -> MetadataResult<Vec<RecordRow>>;

    /// Fetch the records competing under a canonical key.
    async fn find_canonical(&self, key: &CanonicalKey) -> MetadataResult<Vec<RecordRow>>;

    /// Delete a record by id.
    async fn delete_record(&self, id: Uuid) -> MetadataResult<()>;

    /// Count records referencing a blob key.
    async fn count_records_with_file(&self, file_key: &str) -> MetadataResult<u64>;

    /// Find the lingering failure record for a package, if any.
    async fn find_failure(&self, publisher: &str, package: &str)
        -> MetadataResult<Option<RecordRow>>;

    /// Count src records that list `package` as a dependency.
    async fn count_dependents(&self, package: &str) -> MetadataResult<u64>;

    /// De-index a record in place, pointing it at the new canonical home.
    async fn deindex_record(&self, id: Uuid, index_url: &str) -> MetadataResult<()>;

    /// Update the mutable side-channel bookkeeping fields in place.
    async fn update_status(
        &self,
        id: Uuid,
        status: &str,
        build_url: Option<&str>,
    ) -> MetadataResult<()>;
}
