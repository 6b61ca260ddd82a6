//! The canonical package record.

use crate::artifact::{ArtifactKind, CanonicalKey};
use crate::builder::{BuildStats, BuilderMetadata, CommitInfo, JobResult, MaintainerInfo, Registered};
use crate::digest::ContentKey;
use crate::manifest::{BuiltInfo, DependencyEdge, Manifest};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use time::OffsetDateTime;
use uuid::Uuid;

/// Reference to the stored artifact blob backing a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Primary content key (the blob store address).
    pub key: ContentKey,
    pub length: u64,
    pub filename: String,
    pub sha256: String,
    pub md5: String,
}

/// One canonical metadata row per (publisher, package, version,
/// platform-slice).
///
/// Created by a validated upload, mutated in place only for side-channel
/// bookkeeping, and destroyed when superseded or explicitly deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: Uuid,
    pub user: String,
    pub package: String,
    pub version: String,
    pub kind: ArtifactKind,

    // Parsed manifest fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    pub dependencies: Vec<DependencyEdge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built: Option<BuiltInfo>,
    /// Remaining manifest fields, preserved verbatim.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, serde_json::Value>,

    // Blob reference; absent for `failure` records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<BlobRef>,

    // Builder metadata.
    pub commit: CommitInfo,
    pub maintainer: MaintainerInfo,
    pub jobs: Vec<JobResult>,
    #[serde(default)]
    pub stats: BuildStats,
    pub registered: Registered,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,

    // Derived fields.
    pub score: f64,
    pub indexed: bool,
    pub universes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub self_owned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// When de-indexed in favor of another canonical record, points at it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_major: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_at: Option<OffsetDateTime>,
}

impl PackageRecord {
    /// Assemble a record from a parsed manifest, builder metadata and the
    /// stored blob.
    ///
    /// Package and version are taken from the manifest; the validator
    /// checks them against the request path afterwards.
    pub fn assemble(
        user: &str,
        kind: ArtifactKind,
        mut manifest: Manifest,
        builder: BuilderMetadata,
        file: Option<BlobRef>,
    ) -> Self {
        let package = manifest.take_field("Package").unwrap_or_default();
        let version = manifest.take_field("Version").unwrap_or_default();
        let title = manifest.take_field("Title");
        let description = manifest.take_field("Description");
        let authors = manifest.take_field("Author");
        // The builder-resolved maintainer supersedes the manifest line.
        manifest.take_field("Maintainer");

        let arch = manifest.built.as_ref().and_then(BuiltInfo::architecture);
        let platform_major = manifest.built.as_ref().and_then(BuiltInfo::platform_major);

        let extra = manifest
            .fields
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();

        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            user: user.to_string(),
            package,
            version,
            kind,
            title,
            description,
            authors,
            dependencies: manifest.dependencies,
            built: manifest.built,
            extra,
            file,
            commit: builder.commit,
            maintainer: builder.maintainer,
            jobs: builder.jobs,
            stats: builder.stats,
            registered: builder.registered,
            status: builder.status,
            distro: builder.distro,
            upstream: builder.upstream,
            build_url: builder.build_url,
            score: 1.0,
            indexed: false,
            universes: vec![user.to_string()],
            owner: None,
            self_owned: false,
            previous_version: None,
            index_url: None,
            arch,
            platform_major,
            created_at: now,
            published_at: Some(now),
        }
    }

    /// Assemble a blob-less failure record from builder metadata alone.
    pub fn failure(user: &str, package: &str, version: &str, builder: BuilderMetadata) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            user: user.to_string(),
            package: package.to_string(),
            version: version.to_string(),
            kind: ArtifactKind::Failure,
            title: None,
            description: None,
            authors: None,
            dependencies: Vec::new(),
            built: None,
            extra: Map::new(),
            file: None,
            commit: builder.commit,
            maintainer: builder.maintainer,
            jobs: builder.jobs,
            stats: builder.stats,
            registered: builder.registered,
            status: builder.status,
            distro: builder.distro,
            upstream: builder.upstream,
            build_url: builder.build_url,
            score: 1.0,
            indexed: false,
            universes: vec![user.to_string()],
            owner: None,
            self_owned: false,
            previous_version: None,
            index_url: None,
            arch: None,
            platform_major: None,
            created_at: now,
            published_at: Some(now),
        }
    }

    /// The canonical build key this record competes under.
    pub fn canonical_key(&self) -> CanonicalKey {
        CanonicalKey::new(
            &self.user,
            self.kind,
            &self.package,
            self.platform_major.as_deref(),
            self.arch.as_deref(),
            self.distro.as_deref(),
        )
    }

    /// The blob key, for kinds that own one.
    pub fn file_key(&self) -> Option<&ContentKey> {
        self.file.as_ref().map(|f| &f.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderMetadata;

    fn sample_manifest() -> Manifest {
        Manifest::parse(
            "Package: curl\nVersion: 5.2.0\nTitle: Web Client\nImports: jsonlite\nMaintainer: A <a@b.c>\n",
        )
        .unwrap()
    }

    #[test]
    fn assemble_lifts_identity_from_manifest() {
        let record = PackageRecord::assemble(
            "alice",
            ArtifactKind::Src,
            sample_manifest(),
            BuilderMetadata::default(),
            None,
        );
        assert_eq!(record.package, "curl");
        assert_eq!(record.version, "5.2.0");
        assert_eq!(record.title.as_deref(), Some("Web Client"));
        assert_eq!(record.dependencies.len(), 1);
        // Identity fields must not leak into the extras map.
        assert!(!record.extra.contains_key("Package"));
        assert!(!record.extra.contains_key("Maintainer"));
    }

    #[test]
    fn canonical_key_for_src_has_no_platform() {
        let record = PackageRecord::assemble(
            "alice",
            ArtifactKind::Src,
            sample_manifest(),
            BuilderMetadata::default(),
            None,
        );
        let key = record.canonical_key();
        assert_eq!(key.platform_major, None);
        assert_eq!(key.arch, None);
    }

    #[test]
    fn failure_record_owns_no_blob() {
        let record =
            PackageRecord::failure("alice", "curl", "5.2.0", BuilderMetadata::default());
        assert_eq!(record.kind, ArtifactKind::Failure);
        assert!(record.file.is_none());
        assert!(record.file_key().is_none());
    }
}
