//! Content digest types and incremental hashers.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

fn parse_hex<const N: usize>(s: &str) -> crate::Result<[u8; N]> {
    if s.len() != N * 2 {
        return Err(crate::Error::InvalidDigest(format!(
            "expected {} hex chars, got {}",
            N * 2,
            s.len()
        )));
    }
    let mut bytes = [0u8; N];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hex_str =
            std::str::from_utf8(chunk).map_err(|e| crate::Error::InvalidDigest(e.to_string()))?;
        bytes[i] = u8::from_str_radix(hex_str, 16)
            .map_err(|e| crate::Error::InvalidDigest(e.to_string()))?;
    }
    Ok(bytes)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A SHA-256 content digest represented as 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Compute the SHA-256 digest of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Parse from a 64-char lowercase hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        Ok(Self(parse_hex::<32>(s)?))
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// An MD5 transport checksum represented as 16 bytes.
///
/// MD5 is carried purely as a cross-validation checksum for upload
/// integrity, never as a security boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Md5Digest([u8; 16]);

impl Md5Digest {
    /// Compute the MD5 digest of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Parse from a 32-char lowercase hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        Ok(Self(parse_hex::<16>(s)?))
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl fmt::Debug for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Md5Digest({})", self.to_hex())
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The caller-supplied primary digest identifying an uploaded artifact.
///
/// Either algorithm is accepted; the variant is inferred from the hex
/// length (32 chars = MD5, 64 chars = SHA-256). Deduplication and blob
/// addressing always use this key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ContentKey {
    Md5(Md5Digest),
    Sha256(Sha256Digest),
}

impl ContentKey {
    /// Parse a content key from hex, inferring the algorithm from length.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s.len() {
            32 => Ok(Self::Md5(Md5Digest::from_hex(s)?)),
            64 => Ok(Self::Sha256(Sha256Digest::from_hex(s)?)),
            n => Err(crate::Error::InvalidContentKey(format!(
                "expected 32 or 64 hex chars, got {n}"
            ))),
        }
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        match self {
            Self::Md5(d) => d.to_hex(),
            Self::Sha256(d) => d.to_hex(),
        }
    }

    /// Check this key against a computed digest pair.
    ///
    /// Returns the mismatching computed value on failure.
    pub fn verify(&self, computed: &DigestPair) -> crate::Result<()> {
        let (expected, actual) = match self {
            Self::Md5(d) => (d.to_hex(), computed.md5.to_hex()),
            Self::Sha256(d) => (d.to_hex(), computed.sha256.to_hex()),
        };
        if expected == actual {
            Ok(())
        } else {
            Err(crate::Error::ChecksumMismatch { expected, actual })
        }
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({})", self.to_hex())
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<ContentKey> for String {
    fn from(key: ContentKey) -> Self {
        key.to_hex()
    }
}

impl TryFrom<String> for ContentKey {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

/// Both digests of one byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DigestPair {
    pub md5: Md5Digest,
    pub sha256: Sha256Digest,
}

/// Incremental dual hasher, computing MD5 and SHA-256 over one pass.
///
/// Pure digest computation with no storage side effects; compose with a
/// store write by feeding each chunk to both.
pub struct TeeDigest {
    md5: Md5,
    sha256: Sha256,
    length: u64,
}

impl TeeDigest {
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha256: Sha256::new(),
            length: 0,
        }
    }

    /// Feed a chunk to both hashers.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha256.update(data);
        self.length += data.len() as u64;
    }

    /// Total bytes hashed so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Finalize both digests.
    pub fn finalize(self) -> DigestPair {
        DigestPair {
            md5: Md5Digest(self.md5.finalize().into()),
            sha256: Sha256Digest(self.sha256.finalize().into()),
        }
    }
}

impl Default for TeeDigest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_roundtrip() {
        let digest = Sha256Digest::compute(b"hello world");
        let parsed = Sha256Digest::from_hex(&digest.to_hex()).unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn md5_known_value() {
        let digest = Md5Digest::compute(b"abc");
        assert_eq!(digest.to_hex(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn content_key_infers_algorithm_from_length() {
        let md5 = ContentKey::parse("900150983cd24fb0d6963f7d28e17f72").unwrap();
        assert!(matches!(md5, ContentKey::Md5(_)));

        let sha = ContentKey::parse(&Sha256Digest::compute(b"abc").to_hex()).unwrap();
        assert!(matches!(sha, ContentKey::Sha256(_)));

        assert!(ContentKey::parse("abc123").is_err());
        assert!(ContentKey::parse(&"z".repeat(64)).is_err());
    }

    #[test]
    fn tee_digest_matches_single_pass() {
        let data = b"the quick brown fox";
        let mut tee = TeeDigest::new();
        tee.update(&data[..5]);
        tee.update(&data[5..]);
        let pair = tee.finalize();

        assert_eq!(pair.md5, Md5Digest::compute(data));
        assert_eq!(pair.sha256, Sha256Digest::compute(data));
    }

    #[test]
    fn content_key_verify_reports_mismatch() {
        let data = b"payload";
        let mut tee = TeeDigest::new();
        tee.update(data);
        let pair = tee.finalize();

        let key = ContentKey::Sha256(Sha256Digest::compute(data));
        assert!(key.verify(&pair).is_ok());

        let wrong = ContentKey::Sha256(Sha256Digest::compute(b"other"));
        match wrong.verify(&pair) {
            Err(crate::Error::ChecksumMismatch { expected, actual }) => {
                assert_ne!(expected, actual);
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }
}
