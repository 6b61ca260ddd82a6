//! Manifest extraction from uploaded archives.
//!
//! Artifacts are plain or gzipped tar bundles with a single top-level
//! package directory; the manifest lives at `<root>/DESCRIPTION`. The scan
//! stops at the first matching entry.

use crate::manifest::Manifest;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::Component;

/// Manifest file name inside the archive root.
pub const MANIFEST_NAME: &str = "DESCRIPTION";

/// Upper bound on the manifest entry itself (1 MiB).
const MAX_MANIFEST_LEN: u64 = 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Locate and parse the manifest in an archive byte stream.
///
/// The tar scan is CPU-bound synchronous work; async callers should run it
/// on a blocking thread.
pub fn extract_manifest(bytes: &[u8]) -> crate::Result<Manifest> {
    if bytes.starts_with(&GZIP_MAGIC) {
        scan_tar(GzDecoder::new(bytes))
    } else {
        scan_tar(bytes)
    }
}

fn scan_tar<R: Read>(reader: R) -> crate::Result<Manifest> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| crate::Error::Archive(format!("unreadable archive: {e}")))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| crate::Error::Archive(format!("corrupt entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| crate::Error::Archive(format!("invalid entry path: {e}")))?;

        let mut components = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir));
        let is_manifest = matches!(
            (components.next(), components.next(), components.next()),
            (Some(Component::Normal(_)), Some(Component::Normal(name)), None)
                if name == MANIFEST_NAME
        );
        if !is_manifest {
            continue;
        }

        if entry.size() > MAX_MANIFEST_LEN {
            return Err(crate::Error::ManifestParse(format!(
                "manifest entry too large: {} bytes",
                entry.size()
            )));
        }
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|e| crate::Error::ManifestParse(format!("manifest is not UTF-8: {e}")))?;
        return Manifest::parse(&text);
    }

    Err(crate::Error::ManifestMissing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn tarball(entries: &[(&str, &[u8])], gzip: bool) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).unwrap();
        }
        let tar_data = builder.into_inner().unwrap();
        if !gzip {
            return tar_data;
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_data).unwrap();
        encoder.finish().unwrap()
    }

    const DESCRIPTION: &[u8] = b"Package: foo\nVersion: 1.0\n";

    #[test]
    fn extracts_manifest_from_gzipped_tar() {
        let data = tarball(
            &[("foo/R/code.R", b"1 + 1\n"), ("foo/DESCRIPTION", DESCRIPTION)],
            true,
        );
        let manifest = extract_manifest(&data).unwrap();
        assert_eq!(manifest.field("Package"), Some("foo"));
    }

    #[test]
    fn extracts_manifest_from_plain_tar() {
        let data = tarball(&[("foo/DESCRIPTION", DESCRIPTION)], false);
        let manifest = extract_manifest(&data).unwrap();
        assert_eq!(manifest.field("Version"), Some("1.0"));
    }

    #[test]
    fn nested_manifest_is_not_the_manifest() {
        let data = tarball(&[("foo/inst/DESCRIPTION", DESCRIPTION)], true);
        assert!(matches!(
            extract_manifest(&data),
            Err(crate::Error::ManifestMissing)
        ));
    }

    #[test]
    fn archive_without_manifest_is_missing() {
        let data = tarball(&[("foo/R/code.R", b"1 + 1\n")], true);
        assert!(matches!(
            extract_manifest(&data),
            Err(crate::Error::ManifestMissing)
        ));
    }

    #[test]
    fn garbage_bytes_fail_as_archive_error() {
        let result = extract_manifest(b"this is not a tarball at all, not even close");
        assert!(result.is_err());
    }

    #[test]
    fn malformed_manifest_fails_parse() {
        let data = tarball(&[("foo/DESCRIPTION", b"no colon on this line\n")], true);
        assert!(matches!(
            extract_manifest(&data),
            Err(crate::Error::ManifestParse(_))
        ));
    }
}
