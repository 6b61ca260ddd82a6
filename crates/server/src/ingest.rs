//! The ingestion coordinator.
//!
//! Orchestrates one upload transaction: blob write (with dedup), manifest
//! read-back, builder-metadata merge, validation, derived metadata, and the
//! canonical replace-and-garbage-collect step. Failures never leave a
//! partial record; compensating cleanup removes any blob this upload
//! orphaned. Blob reclamation is best-effort by design, so metadata and
//! storage can disagree briefly but never in the direction of data loss.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{BLOBS_DELETED, RECORDS_SUPERSEDED, UPLOADS_DEDUPED};
use granary_core::builder::BuilderMetadata;
use granary_core::derive::{self, MIRROR_USER};
use granary_core::digest::ContentKey;
use granary_core::record::{BlobRef, PackageRecord};
use granary_core::validate::validate_upload;
use granary_core::{ArtifactKind, CanonicalKey, MAX_CANONICAL_MATCHES};
use granary_metadata::{BlobRow, MetadataStore, RecordRow};
use granary_storage::{BlobStore, ByteStream};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// One upload request as decoded from the wire.
#[derive(Debug)]
pub struct UploadRequest {
    pub user: String,
    pub package: String,
    pub version: String,
    pub kind: ArtifactKind,
    pub key: ContentKey,
    pub filename: String,
    pub builder: BuilderMetadata,
}

/// Per-package async locks serializing resolve-and-insert within this
/// process. Uploads to the same (publisher, package) race on the canonical
/// swap otherwise; cross-process races remain tolerated.
#[derive(Default)]
struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    async fn acquire(&self, user: &str, package: &str) -> Arc<Mutex<()>> {
        let key = format!("{user}/{package}");
        let mut map = self.inner.lock().await;
        map.entry(key).or_default().clone()
    }
}

/// Coordinates upload transactions against the blob and metadata stores.
pub struct IngestionCoordinator {
    blobs: BlobStore,
    metadata: Arc<dyn MetadataStore>,
    universe_domain: String,
    locks: KeyLocks,
}

impl IngestionCoordinator {
    pub fn new(
        blobs: BlobStore,
        metadata: Arc<dyn MetadataStore>,
        universe_domain: String,
    ) -> Self {
        Self {
            blobs,
            metadata,
            universe_domain,
            locks: KeyLocks::default(),
        }
    }

    /// Ingest one uploaded artifact, returning the persisted record.
    #[tracing::instrument(
        skip_all,
        fields(user = %req.user, package = %req.package, version = %req.version, kind = %req.kind)
    )]
    pub async fn ingest(&self, req: UploadRequest, body: ByteStream) -> ApiResult<PackageRecord> {
        if !req.kind.owns_blob() {
            return Err(ApiError::BadRequest(
                "failure records are recorded through the failure endpoint".to_string(),
            ));
        }

        let lock = self.locks.acquire(&req.user, &req.package).await;
        let _guard = lock.lock().await;

        // Step 1: store the blob, or short-circuit on dedup.
        let blob_ref = self.store_blob(&req, body).await?;

        // Step 2: re-open the stored blob and extract the manifest. The tar
        // scan is CPU-bound, so it runs off the async scheduler.
        let bytes = self.blobs.get(&req.key).await?;
        let manifest = tokio::task::spawn_blocking(move || {
            granary_core::archive::extract_manifest(&bytes)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("manifest extraction panicked: {e}")))?;
        let manifest = match manifest {
            Ok(manifest) => manifest,
            Err(e) => {
                // A blob without usable metadata is dead weight.
                self.reclaim_blob(&req.key.to_hex()).await;
                return Err(e.into());
            }
        };

        // Step 3: merge builder metadata and dependency edges.
        let mut record =
            PackageRecord::assemble(&req.user, req.kind, manifest, req.builder, Some(blob_ref));

        // Step 4: validate, compensating on failure.
        if let Err(e) = validate_upload(&mut record, &req.package, &req.version) {
            self.reclaim_blob(&req.key.to_hex()).await;
            return Err(e.into());
        }

        // Step 5: derived metadata. Only src records pay for the used-by
        // lookup; a failed query softly omits the bonus.
        let usedby = if record.kind == ArtifactKind::Src {
            match self.metadata.count_dependents(&record.package).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::debug!(error = %e, "used-by lookup failed, omitting score bonus");
                    0
                }
            }
        } else {
            0
        };
        derive::apply(&mut record, &self.universe_domain, usedby);

        // Step 6: canonical resolve, supersede, insert.
        self.resolve_and_insert(&mut record).await?;

        // Step 7: a successful source build retires prior failure state.
        if record.kind == ArtifactKind::Src {
            self.retire_failure(&record.user, &record.package).await?;
        }

        // A newly indexed record makes the mirror's copy non-canonical.
        if record.kind == ArtifactKind::Src && record.indexed && record.user != MIRROR_USER {
            self.deindex_mirror(&record).await;
        }

        Ok(record)
    }

    /// Record a build failure: no blob, no manifest, side channel only.
    #[tracing::instrument(skip_all, fields(user = %user, package = %package, version = %version))]
    pub async fn record_failure(
        &self,
        user: &str,
        package: &str,
        version: &str,
        builder: BuilderMetadata,
    ) -> ApiResult<PackageRecord> {
        let lock = self.locks.acquire(user, package).await;
        let _guard = lock.lock().await;

        let mut record = PackageRecord::failure(user, package, version, builder);
        self.resolve_and_insert(&mut record).await?;
        Ok(record)
    }

    /// Remove one record and garbage-collect its blob when unreferenced.
    pub async fn remove(
        &self,
        user: &str,
        package: &str,
        version: &str,
        kind: ArtifactKind,
    ) -> ApiResult<PackageRecord> {
        let lock = self.locks.acquire(user, package).await;
        let _guard = lock.lock().await;

        let row = self
            .metadata
            .get_record(user, package, version, kind.as_str())
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!("{user}/{package} {version} ({kind})"))
            })?;
        let file_key = row.file_key.clone();
        self.metadata.delete_record(row.id).await?;
        if let Some(key) = file_key {
            self.reclaim_blob(&key).await;
        }
        Ok(row.into_record()?)
    }

    /// Write the blob, or skip the transfer when identical bytes already
    /// live under this key.
    async fn store_blob(&self, req: &UploadRequest, body: ByteStream) -> ApiResult<BlobRef> {
        let key_hex = req.key.to_hex();

        if let Some(row) = self.metadata.get_blob(&key_hex).await? {
            if self.blobs.exists(&req.key).await? {
                UPLOADS_DEDUPED.inc();
                tracing::debug!(key = %key_hex, "blob already stored, skipping body transfer");
                drop(body);
                return Ok(BlobRef {
                    key: req.key,
                    length: row.length.max(0) as u64,
                    filename: row.filename,
                    sha256: row.sha256,
                    md5: row.md5,
                });
            }
            // Bookkeeping row without bytes: fall through and rewrite.
            tracing::warn!(key = %key_hex, "blob row present but object missing, rewriting");
        }

        let stored = self.blobs.put(&req.key, body).await?;
        let row = BlobRow {
            key: key_hex,
            length: stored.length as i64,
            filename: req.filename.clone(),
            sha256: stored.digests.sha256.to_hex(),
            md5: stored.digests.md5.to_hex(),
            uploader: req.user.clone(),
            commit_id: (!req.builder.commit.id.is_empty()).then(|| req.builder.commit.id.clone()),
            created_at: OffsetDateTime::now_utc(),
        };
        self.metadata.insert_blob(&row).await?;

        Ok(BlobRef {
            key: req.key,
            length: stored.length,
            filename: req.filename.clone(),
            sha256: stored.digests.sha256.to_hex(),
            md5: stored.digests.md5.to_hex(),
        })
    }

    /// Canonical resolve: find competing records, stamp `previous_version`,
    /// delete the superseded rows (reclaiming their blobs), insert last.
    async fn resolve_and_insert(&self, record: &mut PackageRecord) -> ApiResult<()> {
        let key = record.canonical_key();
        let matches = self.metadata.find_canonical(&key).await?;

        // A pile-up under one key means the invariant is already broken;
        // abort before touching anything.
        if matches.len() > MAX_CANONICAL_MATCHES {
            return Err(ApiError::Consistency(format!(
                "{} records already match canonical key {key}",
                matches.len()
            )));
        }

        if matches.len() == 1 && matches[0].version != record.version {
            record.previous_version = Some(matches[0].version.clone());
        }

        let new_key_hex = record.file_key().map(ContentKey::to_hex);
        for row in &matches {
            self.metadata.delete_record(row.id).await?;
            RECORDS_SUPERSEDED.inc();
            tracing::info!(
                superseded = %row.id,
                version = %row.version,
                "superseded record removed"
            );
            if let Some(old_key) = &row.file_key {
                // Never reclaim the blob the new record is about to reuse.
                if new_key_hex.as_deref() != Some(old_key.as_str()) {
                    self.reclaim_blob(old_key).await;
                }
            }
        }

        let row = RecordRow::from_record(record)?;
        self.metadata.insert_record(&row).await?;
        Ok(())
    }

    /// Delete any lingering failure record for (user, package).
    async fn retire_failure(&self, user: &str, package: &str) -> ApiResult<()> {
        if let Some(failure) = self.metadata.find_failure(user, package).await? {
            tracing::info!(record = %failure.id, "retiring failure record");
            self.metadata.delete_record(failure.id).await?;
        }
        Ok(())
    }

    /// Flip the mirror's record for this package to non-canonical, pointing
    /// it at the new home. The mirror copy stays visible.
    async fn deindex_mirror(&self, record: &PackageRecord) {
        let key = CanonicalKey::new(
            MIRROR_USER,
            ArtifactKind::Src,
            &record.package,
            None,
            None,
            None,
        );
        let index_url = format!(
            "https://{}.{}/{}",
            record.user, self.universe_domain, record.package
        );
        let rows = match self.metadata.find_canonical(&key).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "mirror lookup failed, skipping de-index");
                return;
            }
        };
        for row in rows.into_iter().filter(|r| r.indexed) {
            if let Err(e) = self.metadata.deindex_record(row.id, &index_url).await {
                tracing::warn!(record = %row.id, error = %e, "failed to de-index mirror record");
            } else {
                tracing::info!(record = %row.id, index_url = %index_url, "de-indexed mirror record");
            }
        }
    }

    /// Best-effort blob reclamation: delete bytes and bookkeeping iff no
    /// record references the key. Returns whether the blob was removed.
    pub async fn reclaim_blob(&self, key_hex: &str) -> bool {
        let referenced = match self.metadata.count_records_with_file(key_hex).await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!(key = %key_hex, error = %e, "reference check failed, keeping blob");
                return false;
            }
        };
        if referenced {
            return false;
        }

        let parsed = match ContentKey::parse(key_hex) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(key = %key_hex, error = %e, "unparseable blob key");
                return false;
            }
        };
        match self.blobs.delete(&parsed).await {
            Ok(()) => {}
            Err(granary_storage::StorageError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(key = %key_hex, error = %e, "blob delete failed, leaving for sweep");
                return false;
            }
        }
        if let Err(e) = self.metadata.delete_blob(key_hex).await {
            tracing::warn!(key = %key_hex, error = %e, "blob row delete failed");
            return false;
        }
        BLOBS_DELETED.inc();
        tracing::debug!(key = %key_hex, "unreferenced blob reclaimed");
        true
    }

    /// Sweep bookkeeping for blobs no record references; used by the admin
    /// GC endpoint to mop up anything inline reclamation missed.
    pub async fn sweep_unreferenced(&self, batch_size: u32) -> ApiResult<u64> {
        let mut deleted = 0u64;
        loop {
            let orphans = self.metadata.list_unreferenced_blobs(batch_size).await?;
            let batch_len = orphans.len();
            if batch_len == 0 {
                break;
            }
            let mut progressed = false;
            for blob in orphans {
                if self.reclaim_blob(&blob.key).await {
                    deleted += 1;
                    progressed = true;
                }
            }
            // A batch that made no progress would repeat forever.
            if !progressed || (batch_len as u32) < batch_size {
                break;
            }
        }
        Ok(deleted)
    }
}
