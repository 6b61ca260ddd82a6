//! Test fixtures: package tarballs, digests, and builder headers.

use base64::Engine;
use flate2::Compression;
use flate2::write::GzEncoder;
use granary_core::digest::{Md5Digest, Sha256Digest};
use serde_json::json;
use std::io::Write;

/// Build a gzipped tarball with the given entries.
#[allow(dead_code)]
pub fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }
    let tar_data = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_data).unwrap();
    encoder.finish().unwrap()
}

/// A source package tarball with the given DESCRIPTION text.
#[allow(dead_code)]
pub fn package_tarball(package: &str, description: &str) -> Vec<u8> {
    tarball(&[
        (
            &format!("{package}/DESCRIPTION"),
            description.as_bytes(),
        ),
        (&format!("{package}/R/code.R"), b"f <- function() 1\n"),
    ])
}

/// Minimal valid src DESCRIPTION.
#[allow(dead_code)]
pub fn src_description(package: &str, version: &str) -> String {
    format!(
        "Package: {package}\nVersion: {version}\nTitle: Test Package\n\
         Description: A package used in tests.\nImports: jsonlite\n"
    )
}

/// DESCRIPTION with a Built line, as produced by a binary build.
#[allow(dead_code)]
pub fn built_description(package: &str, version: &str, built: &str) -> String {
    format!(
        "Package: {package}\nVersion: {version}\nTitle: Test Package\nBuilt: {built}\n"
    )
}

#[allow(dead_code)]
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256Digest::compute(data).to_hex()
}

#[allow(dead_code)]
pub fn md5_hex(data: &[u8]) -> String {
    Md5Digest::compute(data).to_hex()
}

/// Encode a JSON value the way the builder packs side-channel fields:
/// JSON → gzip → base64.
#[allow(dead_code)]
pub fn pack_field(value: &serde_json::Value) -> String {
    let json = serde_json::to_vec(value).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).unwrap();
    base64::engine::general_purpose::STANDARD.encode(encoder.finish().unwrap())
}

/// The standard builder header set for a successful source build.
#[allow(dead_code)]
pub fn builder_headers() -> Vec<(String, String)> {
    vec![
        ("X-Builder-Status".to_string(), "success".to_string()),
        (
            "X-Builder-Commit".to_string(),
            pack_field(&json!({ "id": "deadbeefcafe", "author": "alice" })),
        ),
        (
            "X-Builder-Maintainer".to_string(),
            pack_field(&json!({
                "name": "Alice Tester",
                "email": "alice@example.org",
                "login": "alice"
            })),
        ),
        (
            "X-Builder-Jobs".to_string(),
            pack_field(&json!([{ "config": "source", "check": "OK" }])),
        ),
        (
            "X-Builder-Upstream".to_string(),
            "https://github.com/alice/foo".to_string(),
        ),
    ]
}
