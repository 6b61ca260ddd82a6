//! Structural validation of assembled records.
//!
//! Rules are evaluated in order and the first failure wins. Validation runs
//! after manifest extraction and builder-metadata merge, before any derived
//! metadata is computed or stored state is touched.

use crate::artifact::ArtifactKind;
use crate::record::PackageRecord;

fn fail(msg: impl Into<String>) -> crate::Error {
    crate::Error::Validation(msg.into())
}

/// Validate an uploaded record against the request path, then apply
/// post-validation normalization (the wasm platform rewrite).
pub fn validate_upload(
    record: &mut PackageRecord,
    expected_package: &str,
    expected_version: &str,
) -> crate::Result<()> {
    if record.kind == ArtifactKind::Failure {
        return Err(fail("failure records are not uploadable archives"));
    }

    // Guard against mismatched uploads: the manifest must describe the
    // package and version named in the request path.
    if record.package != expected_package {
        return Err(fail(format!(
            "manifest package '{}' does not match upload path '{}'",
            record.package, expected_package
        )));
    }
    if record.version != expected_version {
        return Err(fail(format!(
            "manifest version '{}' does not match upload path '{}'",
            record.version, expected_version
        )));
    }

    match record.kind {
        ArtifactKind::Src => validate_src(record)?,
        ArtifactKind::Win | ArtifactKind::Mac | ArtifactKind::Linux | ArtifactKind::Wasm => {
            validate_binary(record)?
        }
        ArtifactKind::Failure => unreachable!("rejected above"),
    }

    validate_provenance(record)?;

    // Cross-compiled wasm bundles lack a real platform marker.
    if record.kind == ArtifactKind::Wasm {
        if let Some(built) = record.built.as_mut() {
            built.platform = Some("emscripten".to_string());
        }
    }

    Ok(())
}

/// Source bundles must be unbuilt and carry a usable job matrix.
fn validate_src(record: &PackageRecord) -> crate::Result<()> {
    if record.built.is_some() {
        return Err(fail(
            "source upload carries a Built field; this looks like a binary bundle",
        ));
    }
    if record.jobs.is_empty() {
        return Err(fail("source upload carries no build jobs"));
    }
    for (i, job) in record.jobs.iter().enumerate() {
        if job.config.as_deref().unwrap_or_default().is_empty() {
            return Err(fail(format!("job {i} is missing its config")));
        }
        if job.check.as_deref().unwrap_or_default().is_empty() {
            return Err(fail(format!("job {i} is missing its check result")));
        }
    }
    if !record
        .jobs
        .iter()
        .any(|job| job.config.as_deref() == Some("source"))
    {
        return Err(fail("no job with config \"source\""));
    }
    Ok(())
}

/// Binary bundles must be built for the platform their kind claims.
fn validate_binary(record: &PackageRecord) -> crate::Result<()> {
    let built = record
        .built
        .as_ref()
        .ok_or_else(|| fail("binary upload is missing the Built field"))?;

    let ostype = built.ostype.as_deref().unwrap_or_default();
    let platform = built.platform.as_deref();

    match record.kind {
        ArtifactKind::Win => {
            if ostype != "windows" {
                return Err(fail(format!(
                    "win upload built for OS type '{ostype}', expected 'windows'"
                )));
            }
        }
        ArtifactKind::Mac => {
            if ostype != "unix" {
                return Err(fail(format!(
                    "mac upload built for OS type '{ostype}', expected 'unix'"
                )));
            }
            if let Some(p) = platform {
                if !p.contains("apple") {
                    return Err(fail(format!("mac upload built for platform '{p}'")));
                }
            }
        }
        ArtifactKind::Wasm => {
            if ostype != "unix" {
                return Err(fail(format!(
                    "wasm upload built for OS type '{ostype}', expected 'unix'"
                )));
            }
        }
        ArtifactKind::Linux => {
            if let Some(p) = platform {
                if !p.contains("linux") {
                    return Err(fail(format!("linux upload built for platform '{p}'")));
                }
                if !p.contains("x86_64") && !p.contains("aarch64") {
                    return Err(fail(format!(
                        "linux upload built for unsupported architecture: '{p}'"
                    )));
                }
            }
            if record.distro.as_deref().unwrap_or_default().is_empty() {
                return Err(fail("linux upload is missing the distro field"));
            }
        }
        ArtifactKind::Src | ArtifactKind::Failure => unreachable!("dispatched by kind"),
    }
    Ok(())
}

/// Every non-failure record must say where it came from.
fn validate_provenance(record: &PackageRecord) -> crate::Result<()> {
    if record.status.as_deref().unwrap_or_default().is_empty() {
        return Err(fail("missing build status"));
    }
    if record.commit.id.is_empty() {
        return Err(fail("missing commit id"));
    }
    if record
        .maintainer
        .email
        .as_deref()
        .unwrap_or_default()
        .is_empty()
    {
        return Err(fail("missing maintainer email"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderMetadata, CommitInfo, JobResult, MaintainerInfo};
    use crate::manifest::Manifest;

    fn builder_meta() -> BuilderMetadata {
        BuilderMetadata {
            commit: CommitInfo {
                id: "deadbeef".to_string(),
                ..Default::default()
            },
            maintainer: MaintainerInfo {
                email: Some("a@b.c".to_string()),
                ..Default::default()
            },
            jobs: vec![JobResult {
                config: Some("source".to_string()),
                check: Some("OK".to_string()),
                url: None,
            }],
            status: Some("success".to_string()),
            ..Default::default()
        }
    }

    fn record_for(kind: ArtifactKind, manifest: &str) -> PackageRecord {
        PackageRecord::assemble(
            "alice",
            kind,
            Manifest::parse(manifest).unwrap(),
            builder_meta(),
            None,
        )
    }

    const SRC: &str = "Package: foo\nVersion: 1.0\n";
    const LINUX: &str =
        "Package: foo\nVersion: 1.0\nBuilt: R 4.3.1; x86_64-pc-linux-gnu; 2023-07-21; unix\n";

    #[test]
    fn valid_src_passes() {
        let mut record = record_for(ArtifactKind::Src, SRC);
        validate_upload(&mut record, "foo", "1.0").unwrap();
    }

    #[test]
    fn path_mismatch_rejected() {
        let mut record = record_for(ArtifactKind::Src, SRC);
        assert!(validate_upload(&mut record, "bar", "1.0").is_err());
        let mut record = record_for(ArtifactKind::Src, SRC);
        assert!(validate_upload(&mut record, "foo", "2.0").is_err());
    }

    #[test]
    fn src_with_built_field_rejected() {
        let mut record = record_for(ArtifactKind::Src, LINUX);
        let err = validate_upload(&mut record, "foo", "1.0").unwrap_err();
        assert!(err.to_string().contains("Built"));
    }

    #[test]
    fn src_requires_source_job() {
        let mut record = record_for(ArtifactKind::Src, SRC);
        record.jobs[0].config = Some("linux-release".to_string());
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());

        let mut record = record_for(ArtifactKind::Src, SRC);
        record.jobs.clear();
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());

        let mut record = record_for(ArtifactKind::Src, SRC);
        record.jobs[0].check = None;
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());
    }

    #[test]
    fn binary_without_built_rejected() {
        let mut record = record_for(ArtifactKind::Linux, SRC);
        record.distro = Some("noble".to_string());
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());
    }

    #[test]
    fn win_requires_windows_ostype() {
        let mut record = record_for(
            ArtifactKind::Win,
            "Package: foo\nVersion: 1.0\nBuilt: R 4.3.1; x86_64-w64-mingw32; 2023-07-21; windows\n",
        );
        validate_upload(&mut record, "foo", "1.0").unwrap();

        let mut record = record_for(ArtifactKind::Win, LINUX);
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());
    }

    #[test]
    fn mac_platform_must_mention_apple() {
        let mut record = record_for(
            ArtifactKind::Mac,
            "Package: foo\nVersion: 1.0\nBuilt: R 4.3.1; aarch64-apple-darwin20; 2023-07-21; unix\n",
        );
        validate_upload(&mut record, "foo", "1.0").unwrap();

        let mut record = record_for(ArtifactKind::Mac, LINUX);
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());
    }

    #[test]
    fn linux_requires_distro_and_known_arch() {
        let mut record = record_for(ArtifactKind::Linux, LINUX);
        assert!(
            validate_upload(&mut record, "foo", "1.0").is_err(),
            "missing distro must fail"
        );

        let mut record = record_for(ArtifactKind::Linux, LINUX);
        record.distro = Some("noble".to_string());
        validate_upload(&mut record, "foo", "1.0").unwrap();

        let mut record = record_for(
            ArtifactKind::Linux,
            "Package: foo\nVersion: 1.0\nBuilt: R 4.3.1; riscv64-unknown-linux-gnu; 2023-07-21; unix\n",
        );
        record.distro = Some("noble".to_string());
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());
    }

    #[test]
    fn wasm_requires_unix_ostype() {
        let mut record = record_for(
            ArtifactKind::Wasm,
            "Package: foo\nVersion: 1.0\nBuilt: R 4.3.1; ; 2023-07-21; windows\n",
        );
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());
    }

    #[test]
    fn wasm_platform_rewritten_after_validation() {
        let mut record = record_for(
            ArtifactKind::Wasm,
            "Package: foo\nVersion: 1.0\nBuilt: R 4.3.1; ; 2023-07-21; unix\n",
        );
        validate_upload(&mut record, "foo", "1.0").unwrap();
        assert_eq!(
            record.built.as_ref().unwrap().platform.as_deref(),
            Some("emscripten")
        );
    }

    #[test]
    fn provenance_fields_required() {
        let mut record = record_for(ArtifactKind::Src, SRC);
        record.status = None;
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());

        let mut record = record_for(ArtifactKind::Src, SRC);
        record.commit.id.clear();
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());

        let mut record = record_for(ArtifactKind::Src, SRC);
        record.maintainer.email = None;
        assert!(validate_upload(&mut record, "foo", "1.0").is_err());
    }
}
