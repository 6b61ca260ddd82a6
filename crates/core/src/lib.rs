//! Core domain types and shared logic for the granary package registry.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content keys and dual-digest hashing
//! - Artifact kinds and canonical build keys
//! - DESCRIPTION manifest parsing and archive extraction
//! - Builder side-channel metadata
//! - Record validation and derived-metadata computation

pub mod archive;
pub mod artifact;
pub mod builder;
pub mod config;
pub mod derive;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod record;
pub mod validate;

pub use artifact::{ArtifactKind, CanonicalKey};
pub use builder::{BuildStats, BuilderMetadata, CommitInfo, JobResult, MaintainerInfo, Registered};
pub use digest::{ContentKey, DigestPair, Md5Digest, Sha256Digest, TeeDigest};
pub use error::{Error, Result};
pub use manifest::{BuiltInfo, DependencyEdge, DependencyRole, Manifest};
pub use record::{BlobRef, PackageRecord};

/// More canonical-key matches than this signals data corruption and aborts
/// an upload.
pub const MAX_CANONICAL_MATCHES: usize = 3;
