//! Database models mapping to the metadata schema.
//!
//! `RecordRow` flattens the typed columns used for querying; structured
//! sub-objects (maintainer, commit, jobs, dependencies, …) are carried as
//! JSON text columns and round-tripped through serde.

use crate::error::{MetadataError, MetadataResult};
use granary_core::builder::Registered;
use granary_core::digest::ContentKey;
use granary_core::record::{BlobRef, PackageRecord};
use granary_core::ArtifactKind;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Package record row.
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub publisher: String,
    pub package: String,
    pub version: String,
    pub kind: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub authors: Option<String>,
    pub maintainer: String,
    pub dependencies: String,
    pub built: Option<String>,
    pub extra: String,

    pub file_key: Option<String>,
    pub file_length: Option<i64>,
    pub file_sha256: Option<String>,
    pub file_md5: Option<String>,
    pub filename: Option<String>,

    pub commit_json: String,
    pub jobs: String,
    pub stats: String,
    pub registered: Option<bool>,
    pub status: Option<String>,
    pub distro: Option<String>,
    pub upstream: Option<String>,
    pub build_url: Option<String>,

    pub score: f64,
    pub indexed: bool,
    pub universes: String,
    pub owner: Option<String>,
    pub self_owned: bool,
    pub previous_version: Option<String>,
    pub index_url: Option<String>,
    pub arch: Option<String>,
    pub platform_major: Option<String>,

    pub created_at: OffsetDateTime,
    pub published_at: Option<OffsetDateTime>,
}

fn to_json<T: serde::Serialize>(value: &T) -> MetadataResult<String> {
    serde_json::to_string(value).map_err(|e| MetadataError::Internal(format!("encode json: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(column: &str, value: &str) -> MetadataResult<T> {
    serde_json::from_str(value)
        .map_err(|e| MetadataError::Internal(format!("decode {column} column: {e}")))
}

impl RecordRow {
    /// Flatten a domain record into a row.
    pub fn from_record(record: &PackageRecord) -> MetadataResult<Self> {
        let registered = match record.registered {
            Registered::Unset => None,
            Registered::True => Some(true),
            Registered::False => Some(false),
        };
        Ok(Self {
            id: record.id,
            publisher: record.user.clone(),
            package: record.package.clone(),
            version: record.version.clone(),
            kind: record.kind.as_str().to_string(),
            title: record.title.clone(),
            description: record.description.clone(),
            authors: record.authors.clone(),
            maintainer: to_json(&record.maintainer)?,
            dependencies: to_json(&record.dependencies)?,
            built: record.built.as_ref().map(to_json).transpose()?,
            extra: to_json(&record.extra)?,
            file_key: record.file.as_ref().map(|f| f.key.to_hex()),
            file_length: record.file.as_ref().map(|f| f.length as i64),
            file_sha256: record.file.as_ref().map(|f| f.sha256.clone()),
            file_md5: record.file.as_ref().map(|f| f.md5.clone()),
            filename: record.file.as_ref().map(|f| f.filename.clone()),
            commit_json: to_json(&record.commit)?,
            jobs: to_json(&record.jobs)?,
            stats: to_json(&record.stats)?,
            registered,
            status: record.status.clone(),
            distro: record.distro.clone(),
            upstream: record.upstream.clone(),
            build_url: record.build_url.clone(),
            score: record.score,
            indexed: record.indexed,
            universes: to_json(&record.universes)?,
            owner: record.owner.clone(),
            self_owned: record.self_owned,
            previous_version: record.previous_version.clone(),
            index_url: record.index_url.clone(),
            arch: record.arch.clone(),
            platform_major: record.platform_major.clone(),
            created_at: record.created_at,
            published_at: record.published_at,
        })
    }

    /// Rebuild the domain record from a row.
    pub fn into_record(self) -> MetadataResult<PackageRecord> {
        let kind = ArtifactKind::parse(&self.kind)
            .map_err(|e| MetadataError::Internal(format!("kind column: {e}")))?;
        let registered = match self.registered {
            None => Registered::Unset,
            Some(true) => Registered::True,
            Some(false) => Registered::False,
        };

        let file = match (
            self.file_key,
            self.file_length,
            self.file_sha256,
            self.file_md5,
            self.filename,
        ) {
            (Some(key), Some(length), Some(sha256), Some(md5), Some(filename)) => Some(BlobRef {
                key: ContentKey::parse(&key)
                    .map_err(|e| MetadataError::Internal(format!("file_key column: {e}")))?,
                length: length.max(0) as u64,
                filename,
                sha256,
                md5,
            }),
            _ => None,
        };

        Ok(PackageRecord {
            id: self.id,
            user: self.publisher,
            package: self.package,
            version: self.version,
            kind,
            title: self.title,
            description: self.description,
            authors: self.authors,
            maintainer: from_json("maintainer", &self.maintainer)?,
            dependencies: from_json("dependencies", &self.dependencies)?,
            built: self
                .built
                .as_deref()
                .map(|v| from_json("built", v))
                .transpose()?,
            extra: from_json("extra", &self.extra)?,
            file,
            commit: from_json("commit_json", &self.commit_json)?,
            jobs: from_json("jobs", &self.jobs)?,
            stats: from_json("stats", &self.stats)?,
            registered,
            status: self.status,
            distro: self.distro,
            upstream: self.upstream,
            build_url: self.build_url,
            score: self.score,
            indexed: self.indexed,
            universes: from_json("universes", &self.universes)?,
            owner: self.owner,
            self_owned: self.self_owned,
            previous_version: self.previous_version,
            index_url: self.index_url,
            arch: self.arch,
            platform_major: self.platform_major,
            created_at: self.created_at,
            published_at: self.published_at,
        })
    }
}

/// Blob bookkeeping row.
///
/// Rows are immutable once written and deleted only when no record
/// references the key.
#[derive(Debug, Clone, FromRow)]
pub struct BlobRow {
    pub key: String,
    pub length: i64,
    pub filename: String,
    pub sha256: String,
    pub md5: String,
    pub uploader: String,
    pub commit_id: Option<String>,
    pub created_at: OffsetDateTime,
}
