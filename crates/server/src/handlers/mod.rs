//! HTTP handlers.

pub mod admin;
pub mod blobs;
pub mod packages;

pub use admin::{gc_sweep, health_check};
pub use blobs::get_blob;
pub use packages::{
    delete_failure, delete_record, get_record, list_records, publish, record_failure,
    update_status,
};
