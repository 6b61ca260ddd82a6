//! Repository traits for metadata operations.

pub mod blobs;
pub mod records;

pub use blobs::BlobRepo;
pub use records::RecordRepo;
