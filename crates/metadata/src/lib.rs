//! Metadata store for granary.
//!
//! One canonical row per package record plus blob bookkeeping, backed by
//! SQLite. The store exposes repository traits so the ingestion engine
//! never depends on a concrete backend.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{BlobRow, RecordRow};
pub use repos::{BlobRepo, RecordRepo};
pub use store::{MetadataStore, SqliteStore};

use granary_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store))
        }
    }
}
