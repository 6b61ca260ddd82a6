//! Artifact kinds and canonical build keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of artifact a record describes.
///
/// The five archive kinds carry an uploaded bundle; `Failure` is a
/// blob-less marker recording a broken build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Src,
    Win,
    Mac,
    Linux,
    Wasm,
    Failure,
}

impl ArtifactKind {
    /// Parse from the request-path token.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "src" => Ok(Self::Src),
            "win" => Ok(Self::Win),
            "mac" => Ok(Self::Mac),
            "linux" => Ok(Self::Linux),
            "wasm" => Ok(Self::Wasm),
            "failure" => Ok(Self::Failure),
            other => Err(crate::Error::InvalidArtifactKind(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Src => "src",
            Self::Win => "win",
            Self::Mac => "mac",
            Self::Linux => "linux",
            Self::Wasm => "wasm",
            Self::Failure => "failure",
        }
    }

    /// Whether this kind is a platform-specific binary bundle.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Win | Self::Mac | Self::Linux | Self::Wasm)
    }

    /// Whether records of this kind reference a stored blob.
    pub fn owns_blob(&self) -> bool {
        !matches!(self, Self::Failure)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The field tuple identifying which existing records a new upload
/// supersedes.
///
/// - `src` and `failure` compete on (publisher, kind, package) alone.
/// - `win`/`mac`/`wasm` additionally pin the platform major version and,
///   when known, the architecture.
/// - `linux` further pins the distribution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalKey {
    pub user: String,
    pub kind: ArtifactKind,
    pub package: String,
    pub platform_major: Option<String>,
    pub arch: Option<String>,
    pub distro: Option<String>,
}

impl CanonicalKey {
    /// Build the key for a record's identifying fields.
    pub fn new(
        user: &str,
        kind: ArtifactKind,
        package: &str,
        platform_major: Option<&str>,
        arch: Option<&str>,
        distro: Option<&str>,
    ) -> Self {
        let base = Self {
            user: user.to_string(),
            kind,
            package: package.to_string(),
            platform_major: None,
            arch: None,
            distro: None,
        };
        match kind {
            ArtifactKind::Src | ArtifactKind::Failure => base,
            ArtifactKind::Win | ArtifactKind::Mac | ArtifactKind::Wasm => Self {
                platform_major: platform_major.map(str::to_string),
                arch: arch.map(str::to_string),
                ..base
            },
            ArtifactKind::Linux => Self {
                platform_major: platform_major.map(str::to_string),
                arch: arch.map(str::to_string),
                distro: distro.map(str::to_string),
                ..base
            },
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user, self.kind, self.package)?;
        if let Some(ref v) = self.platform_major {
            write!(f, "/{v}")?;
        }
        if let Some(ref a) = self.arch {
            write!(f, "/{a}")?;
        }
        if let Some(ref d) = self.distro {
            write!(f, "/{d}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parse_roundtrip() {
        for s in ["src", "win", "mac", "linux", "wasm", "failure"] {
            assert_eq!(ArtifactKind::parse(s).unwrap().as_str(), s);
        }
        assert!(ArtifactKind::parse("sparc").is_err());
    }

    #[test]
    fn src_key_ignores_platform_fields() {
        let key = CanonicalKey::new(
            "alice",
            ArtifactKind::Src,
            "pkg",
            Some("4.3"),
            Some("x86_64"),
            Some("noble"),
        );
        assert_eq!(key.platform_major, None);
        assert_eq!(key.arch, None);
        assert_eq!(key.distro, None);
    }

    #[test]
    fn linux_key_carries_distro() {
        let key = CanonicalKey::new(
            "alice",
            ArtifactKind::Linux,
            "pkg",
            Some("4.3"),
            Some("x86_64"),
            Some("noble"),
        );
        assert_eq!(key.distro.as_deref(), Some("noble"));
    }

    #[test]
    fn mac_key_drops_distro() {
        let key = CanonicalKey::new(
            "alice",
            ArtifactKind::Mac,
            "pkg",
            Some("4.3"),
            Some("aarch64"),
            Some("noble"),
        );
        assert_eq!(key.platform_major.as_deref(), Some("4.3"));
        assert_eq!(key.distro, None);
    }
}
