//! Application state shared across handlers.

use crate::ingest::IngestionCoordinator;
use granary_core::config::AppConfig;
use granary_metadata::MetadataStore;
use granary_storage::{BlobStore, ObjectStore};
use std::sync::Arc;

/// Shared application state. Store clients are constructed once at startup
/// and injected here; no component reaches for ambient globals.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Content-addressed blob store.
    pub blobs: BlobStore,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Upload transaction coordinator.
    pub ingest: Arc<IngestionCoordinator>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Panics
    ///
    /// Panics if the configuration fails validation; startup is the only
    /// caller and cannot proceed with a broken config.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        if let Err(error) = config.validate() {
            panic!("invalid configuration: {error}");
        }
        crate::metrics::register_metrics();

        let blobs = BlobStore::new(storage);
        let ingest = Arc::new(IngestionCoordinator::new(
            blobs.clone(),
            metadata.clone(),
            config.server.universe_domain.clone(),
        ));

        Self {
            config: Arc::new(config),
            blobs,
            metadata,
            ingest,
        }
    }
}
