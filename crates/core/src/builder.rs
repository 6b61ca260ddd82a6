//! Builder metadata carried out-of-band with an upload.
//!
//! Build context travels in request headers under a reserved name prefix
//! rather than inside the archive. Structured fields (`jobs`, `commit`,
//! `maintainer`, `stats`) are base64-encoded gzipped JSON; a field that is
//! absent or fails to decode yields the empty structure, never an error.

use base64::Engine;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::io::Read;

/// Reserved header prefix identifying builder fields.
pub const HEADER_PREFIX: &str = "x-builder-";

/// Upper bound on a decompressed side-channel field (1 MiB).
const MAX_DECODED_LEN: u64 = 1024 * 1024;

/// Explicit tri-state for the `registered` side-channel flag.
///
/// Only the literal string `"false"` means false; anything else, including
/// absence, counts as registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Registered {
    #[default]
    Unset,
    True,
    False,
}

impl Registered {
    pub fn from_field(value: Option<&str>) -> Self {
        match value {
            None => Self::Unset,
            Some("false") => Self::False,
            Some(_) => Self::True,
        }
    }

    /// Effective boolean value (unset defaults to registered).
    pub fn is_registered(&self) -> bool {
        !matches!(self, Self::False)
    }
}

/// The commit an artifact was built from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

/// Maintainer contact resolved by the builder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintainerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
}

/// One build-matrix job result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Popularity signals gathered by the builder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildStats {
    pub stars: u64,
    pub searchresults: u64,
    pub vignettes: u64,
    pub datasets: u64,
    pub updates: u64,
    pub contributors: u64,
    pub downloads: u64,
    pub mentions: u64,
    pub readme: bool,
    pub on_archive: bool,
}

/// All builder metadata decoded from the side channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuilderMetadata {
    pub commit: CommitInfo,
    pub maintainer: MaintainerInfo,
    pub jobs: Vec<JobResult>,
    pub stats: BuildStats,
    pub registered: Registered,
    pub status: Option<String>,
    pub distro: Option<String>,
    pub upstream: Option<String>,
    pub build_url: Option<String>,
}

impl BuilderMetadata {
    /// Decode builder metadata from header pairs.
    ///
    /// Header names are matched case-insensitively against the reserved
    /// prefix; the remainder is lower-cased to select the field.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut meta = Self::default();
        let mut registered_raw: Option<String> = None;

        for (name, value) in headers {
            let lower = name.to_ascii_lowercase();
            let Some(field) = lower.strip_prefix(HEADER_PREFIX) else {
                continue;
            };
            match field {
                "commit" => meta.commit = decode_packed(value).unwrap_or_default(),
                "maintainer" => meta.maintainer = decode_packed(value).unwrap_or_default(),
                "jobs" => meta.jobs = decode_packed(value).unwrap_or_default(),
                "stats" => meta.stats = decode_packed(value).unwrap_or_default(),
                "registered" => registered_raw = Some(value.to_string()),
                "status" => meta.status = Some(value.to_string()),
                "distro" => meta.distro = Some(value.to_string()),
                "upstream" => meta.upstream = Some(value.to_string()),
                "url" => meta.build_url = Some(value.to_string()),
                other => {
                    tracing::debug!(field = %other, "ignoring unknown builder field");
                }
            }
        }

        meta.registered = Registered::from_field(registered_raw.as_deref());
        meta
    }
}

/// Decode a base64 → gzip → JSON side-channel value.
///
/// Returns `None` on any decode failure; callers substitute the empty
/// structure.
pub fn decode_packed<T: DeserializeOwned>(value: &str) -> Option<T> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .ok()?;
    let mut json = String::new();
    GzDecoder::new(compressed.as_slice())
        .take(MAX_DECODED_LEN)
        .read_to_string(&mut json)
        .ok()?;
    match serde_json::from_str(&json) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::debug!(error = %e, "builder field JSON did not decode");
            None
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_packed<T: Serialize>(value: &T) -> String {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let json = serde_json::to_vec(value).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).unwrap();
    base64::engine::general_purpose::STANDARD.encode(encoder.finish().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_tri_state() {
        assert_eq!(Registered::from_field(None), Registered::Unset);
        assert_eq!(Registered::from_field(Some("false")), Registered::False);
        assert_eq!(Registered::from_field(Some("true")), Registered::True);
        assert_eq!(Registered::from_field(Some("yes")), Registered::True);

        assert!(Registered::Unset.is_registered());
        assert!(!Registered::False.is_registered());
    }

    #[test]
    fn packed_field_roundtrip() {
        let commit = CommitInfo {
            id: "abc123".to_string(),
            author: Some("alice".to_string()),
            message: None,
            time: Some(1_700_000_000),
        };
        let encoded = encode_packed(&commit);
        let decoded: CommitInfo = decode_packed(&encoded).unwrap();
        assert_eq!(decoded, commit);
    }

    #[test]
    fn invalid_packed_field_decodes_to_empty() {
        let meta = BuilderMetadata::from_headers([("X-Builder-Commit", "not base64!!")]);
        assert_eq!(meta.commit, CommitInfo::default());
    }

    #[test]
    fn headers_are_unprefixed_and_lowercased() {
        let jobs = vec![JobResult {
            config: Some("source".to_string()),
            check: Some("OK".to_string()),
            url: None,
        }];
        let packed = encode_packed(&jobs);
        let meta = BuilderMetadata::from_headers([
            ("X-Builder-Jobs", packed.as_str()),
            ("X-BUILDER-STATUS", "success"),
            ("X-Builder-Distro", "noble"),
            ("Content-Type", "application/octet-stream"),
        ]);

        assert_eq!(meta.jobs, jobs);
        assert_eq!(meta.status.as_deref(), Some("success"));
        assert_eq!(meta.distro.as_deref(), Some("noble"));
    }
}
