//! Content-addressed blob adapter.
//!
//! Sits on top of an [`ObjectStore`] and enforces the content-addressing
//! contract: objects live under their hex digest, writes verify that the
//! caller-supplied key matches the bytes actually received, and nothing
//! partial survives a failed upload.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore};
use bytes::Bytes;
use futures::StreamExt;
use granary_core::digest::{ContentKey, DigestPair, TeeDigest};
use std::sync::Arc;

/// Digests and size of a freshly stored blob.
#[derive(Clone, Copy, Debug)]
pub struct StoredBlob {
    pub length: u64,
    pub digests: DigestPair,
}

/// Content-addressed view over an object store.
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
}

impl BlobStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Backend object key for a content key: sharded by the first two hex
    /// chars to keep directories shallow.
    pub fn object_key(key: &ContentKey) -> String {
        let hex = key.to_hex();
        format!("{}/{hex}", &hex[..2])
    }

    /// Whether the blob bytes are present in the backend.
    pub async fn exists(&self, key: &ContentKey) -> StorageResult<bool> {
        self.store.exists(&Self::object_key(key)).await
    }

    /// Stream an upload into storage, verifying the declared content key.
    ///
    /// The digest computation is a pure tee over the stream, composed with
    /// the backend write; on any stream error the backend upload is aborted,
    /// and on a digest mismatch the just-written object is deleted before
    /// the error surfaces. Callers are expected to have taken the dedup
    /// short-circuit before calling this.
    pub async fn put(&self, key: &ContentKey, mut stream: ByteStream) -> StorageResult<StoredBlob> {
        let object_key = Self::object_key(key);
        let mut upload = self.store.put_stream(&object_key).await?;
        let mut tee = TeeDigest::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Client disconnect or transport failure: nothing may
                    // remain under the key.
                    upload.abort().await?;
                    return Err(e);
                }
            };
            tee.update(&chunk);
            if let Err(e) = upload.write(chunk).await {
                upload.abort().await?;
                return Err(e);
            }
        }

        let length = upload.finish().await?;
        let digests = tee.finalize();

        if let Err(e) = key.verify(&digests) {
            tracing::warn!(key = %key, "checksum mismatch, deleting stored object");
            self.store.delete(&object_key).await?;
            let granary_core::Error::ChecksumMismatch { expected, actual } = e else {
                return Err(StorageError::Backend(format!(
                    "unexpected verify error: {e}"
                )));
            };
            return Err(StorageError::ChecksumMismatch { expected, actual });
        }

        Ok(StoredBlob { length, digests })
    }

    /// Fetch a whole blob.
    pub async fn get(&self, key: &ContentKey) -> StorageResult<Bytes> {
        self.store.get(&Self::object_key(key)).await
    }

    /// Fetch a blob as a byte stream.
    pub async fn get_stream(&self, key: &ContentKey) -> StorageResult<ByteStream> {
        self.store.get_stream(&Self::object_key(key)).await
    }

    /// Delete a blob's bytes.
    ///
    /// Reference counting is the caller's job: nothing here checks whether
    /// records still point at the key.
    pub async fn delete(&self, key: &ContentKey) -> StorageResult<()> {
        self.store.delete(&Self::object_key(key)).await
    }

    /// The underlying object store.
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::filesystem::FilesystemBackend;
    use granary_core::digest::{Md5Digest, Sha256Digest};

    fn byte_stream(chunks: Vec<StorageResult<Bytes>>) -> ByteStream {
        Box::pin(futures::stream::iter(chunks))
    }

    async fn store() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        (dir, BlobStore::new(Arc::new(backend)))
    }

    #[tokio::test]
    async fn put_verifies_sha256_key() {
        let (_dir, blobs) = store().await;
        let data = b"artifact bytes";
        let key = ContentKey::Sha256(Sha256Digest::compute(data));

        let stored = blobs
            .put(&key, byte_stream(vec![Ok(Bytes::from_static(data))]))
            .await
            .unwrap();

        assert_eq!(stored.length, data.len() as u64);
        assert_eq!(stored.digests.md5, Md5Digest::compute(data));
        assert!(blobs.exists(&key).await.unwrap());
        assert_eq!(blobs.get(&key).await.unwrap(), Bytes::from_static(data));
    }

    #[tokio::test]
    async fn put_accepts_md5_key() {
        let (_dir, blobs) = store().await;
        let data = b"more bytes";
        let key = ContentKey::Md5(Md5Digest::compute(data));

        let stored = blobs
            .put(&key, byte_stream(vec![Ok(Bytes::from_static(data))]))
            .await
            .unwrap();
        assert_eq!(stored.digests.sha256, Sha256Digest::compute(data));
    }

    #[tokio::test]
    async fn mismatched_key_deletes_partial_object() {
        let (_dir, blobs) = store().await;
        let key = ContentKey::Sha256(Sha256Digest::compute(b"declared content"));

        let result = blobs
            .put(&key, byte_stream(vec![Ok(Bytes::from_static(b"different"))]))
            .await;

        match result {
            Err(StorageError::ChecksumMismatch { .. }) => {}
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
        assert!(!blobs.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn stream_error_aborts_upload() {
        let (_dir, blobs) = store().await;
        let key = ContentKey::Sha256(Sha256Digest::compute(b"never arrives"));

        let result = blobs
            .put(
                &key,
                byte_stream(vec![
                    Ok(Bytes::from_static(b"first chunk")),
                    Err(StorageError::Backend("connection reset".to_string())),
                ]),
            )
            .await;

        assert!(result.is_err());
        assert!(!blobs.exists(&key).await.unwrap());
        assert!(blobs.inner().list("").await.unwrap().is_empty());
    }
}
