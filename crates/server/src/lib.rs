//! Granary ingestion server.
//!
//! Accepts built package archives, stores their bytes content-addressed,
//! parses and validates the embedded manifest, computes derived metadata,
//! and keeps exactly one live record per canonical build key.

pub mod error;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use ingest::{IngestionCoordinator, UploadRequest};
pub use routes::create_router;
pub use state::AppState;
