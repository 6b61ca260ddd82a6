//! Derived metadata: ownership, indexing eligibility, universe membership
//! and the popularity score.

use crate::artifact::ArtifactKind;
use crate::record::PackageRecord;
use url::Url;

/// Organizations whose publishers are treated as self-owned regardless of
/// the resolved upstream owner.
const TRUSTED_ORGS: &[&str] = &["ropensci"];

/// Mirror-only publisher; its records are never self-owned.
pub const MIRROR_USER: &str = "cran";

/// Mention counts saturate here before contributing to the score.
const MENTION_CAP: u64 = 1000;

/// Resolve the owning account from an upstream repository URL.
///
/// GitHub yields the organization name directly; other known forges yield
/// `{shorthand}-{org}`. The Bioconductor git mirror is an alias for its
/// GitHub organization.
pub fn resolve_owner(upstream: &str) -> Option<String> {
    let normalized = if upstream.contains("://") {
        upstream.to_string()
    } else {
        format!("https://{upstream}")
    };
    let url = Url::parse(&normalized).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let org = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase());

    match host.as_str() {
        // The Bioconductor mirror hosts every package under one account.
        "git.bioconductor.org" => Some("bioconductor".to_string()),
        "github.com" => org,
        "gitlab.com" => org.map(|o| format!("gitlab-{o}")),
        "bitbucket.org" => org.map(|o| format!("bitbucket-{o}")),
        "codeberg.org" => org.map(|o| format!("codeberg-{o}")),
        _ => None,
    }
}

/// Whether the publisher is publishing their own package.
pub fn is_self_owned(user: &str, owner: Option<&str>, maintainer_login: Option<&str>) -> bool {
    if user == MIRROR_USER {
        return false;
    }
    owner.is_some_and(|o| o.eq_ignore_ascii_case(user))
        || maintainer_login.is_some_and(|l| l.eq_ignore_ascii_case(user))
        || TRUSTED_ORGS.iter().any(|org| org.eq_ignore_ascii_case(user))
}

/// Whether a src record is eligible to be the publicly discoverable entry
/// for its package name.
pub fn is_indexed(record: &PackageRecord, universe_domain: &str) -> bool {
    if record.kind != ArtifactKind::Src {
        return false;
    }
    // Explicit opt-out always wins.
    if record.extra.contains_key("Noindex") {
        return false;
    }
    // A URL naming the publisher's own universe subdomain is an explicit
    // claim of this universe as home.
    let subdomain = format!("{}.{}", record.user.to_ascii_lowercase(), universe_domain);
    if manifest_urls(record).any(|url| url_host(&url).as_deref() == Some(subdomain.as_str())) {
        return true;
    }
    record
        .owner
        .as_deref()
        .is_some_and(|owner| owner.eq_ignore_ascii_case(&record.user))
}

/// Universe memberships: the publisher, plus (when indexed) the
/// maintainer's login and the owner of the first development URL.
pub fn universes(record: &PackageRecord) -> Vec<String> {
    let mut universes = vec![record.user.clone()];
    if record.indexed {
        if let Some(login) = record.maintainer.login.as_deref() {
            universes.push(login.to_string());
        }
        if let Some(dev_owner) = manifest_urls(record).find_map(|url| resolve_owner(&url)) {
            universes.push(dev_owner);
        }
    }
    let mut seen = Vec::new();
    universes.retain(|u| {
        let duplicate = seen.iter().any(|s: &String| s.eq_ignore_ascii_case(u));
        if !duplicate {
            seen.push(u.clone());
        }
        !duplicate
    });
    universes
}

fn manifest_urls(record: &PackageRecord) -> impl Iterator<Item = String> + '_ {
    record
        .extra
        .get("URL")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .split([',', ' '])
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn url_host(url: &str) -> Option<String> {
    let normalized = if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    Url::parse(&normalized)
        .ok()?
        .host_str()
        .map(|h| h.to_ascii_lowercase())
}

/// Popularity signals for one src record.
///
/// Most signals arrive in the builder stats side channel; `usedby` is the
/// reverse-dependency count queried from the metadata store.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScoreSignals {
    pub stars: u64,
    pub usedby: u64,
    pub searchresults: u64,
    pub vignettes: u64,
    pub datasets: u64,
    pub updates: u64,
    pub contributors: u64,
    pub on_archive: bool,
    pub readme: bool,
    pub downloads: u64,
    pub mentions: u64,
}

impl ScoreSignals {
    /// Monotonic, saturating popularity estimate.
    ///
    /// Base 1.0 plus `log10(max(1, weighted signal))` per signal, so the
    /// score is never negative and is dominated by order-of-magnitude
    /// changes in any one signal.
    pub fn score(&self) -> f64 {
        fn bonus(weighted: f64) -> f64 {
            if weighted > 1.0 { weighted.log10() } else { 0.0 }
        }

        1.0 + bonus(self.stars as f64)
            + bonus(self.usedby as f64 * 3.0)
            + bonus(self.searchresults as f64 / 10.0)
            + bonus(self.vignettes as f64 * 10.0)
            + bonus(self.datasets as f64 * 5.0)
            + bonus(self.updates as f64)
            + bonus(self.contributors.saturating_sub(1) as f64)
            + bonus(if self.on_archive { 10.0 } else { 0.0 })
            + bonus(if self.readme { 5.0 } else { 0.0 })
            + bonus(self.downloads as f64 / 1000.0)
            + bonus(self.mentions.min(MENTION_CAP) as f64)
    }
}

/// Compute and apply all derived fields to a record.
///
/// `usedby` is only meaningful for src records; pass zero otherwise.
pub fn apply(record: &mut PackageRecord, universe_domain: &str, usedby: u64) {
    record.owner = record.upstream.as_deref().and_then(resolve_owner);
    record.self_owned = is_self_owned(
        &record.user,
        record.owner.as_deref(),
        record.maintainer.login.as_deref(),
    );

    if record.kind == ArtifactKind::Src {
        record.indexed = is_indexed(record, universe_domain);
        record.universes = universes(record);
        let stats = record.stats;
        record.score = ScoreSignals {
            usedby,
            stars: stats.stars,
            searchresults: stats.searchresults,
            vignettes: stats.vignettes,
            datasets: stats.datasets,
            updates: stats.updates,
            contributors: stats.contributors,
            on_archive: stats.on_archive,
            readme: stats.readme,
            downloads: stats.downloads,
            mentions: stats.mentions,
        }
        .score();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderMetadata;
    use crate::manifest::Manifest;

    fn src_record(user: &str, manifest: &str) -> PackageRecord {
        PackageRecord::assemble(
            user,
            ArtifactKind::Src,
            Manifest::parse(manifest).unwrap(),
            BuilderMetadata::default(),
            None,
        )
    }

    #[test]
    fn owner_from_github_is_the_org() {
        assert_eq!(
            resolve_owner("https://github.com/jeroen/curl").as_deref(),
            Some("jeroen")
        );
        assert_eq!(
            resolve_owner("github.com/Jeroen/curl").as_deref(),
            Some("jeroen")
        );
    }

    #[test]
    fn owner_from_other_forges_is_prefixed() {
        assert_eq!(
            resolve_owner("https://gitlab.com/r-packages/yaml").as_deref(),
            Some("gitlab-r-packages")
        );
        assert_eq!(
            resolve_owner("https://bitbucket.org/djnavarro/foo").as_deref(),
            Some("bitbucket-djnavarro")
        );
    }

    #[test]
    fn bioconductor_mirror_resolves_to_github_org() {
        assert_eq!(
            resolve_owner("https://git.bioconductor.org/packages/Biostrings").as_deref(),
            Some("bioconductor")
        );
    }

    #[test]
    fn unknown_hosts_have_no_owner() {
        assert_eq!(resolve_owner("https://example.com/foo/bar"), None);
        assert_eq!(resolve_owner("not a url at all \u{7f}"), None);
    }

    #[test]
    fn mirror_user_is_never_self_owned() {
        assert!(!is_self_owned("cran", Some("cran"), Some("cran")));
        assert!(is_self_owned("jeroen", Some("jeroen"), None));
        assert!(is_self_owned("jeroen", None, Some("jeroen")));
        assert!(is_self_owned("ropensci", None, None));
        assert!(!is_self_owned("alice", Some("bob"), Some("carol")));
    }

    #[test]
    fn indexed_by_universe_subdomain() {
        let record = src_record(
            "jeroen",
            "Package: curl\nVersion: 1.0\nURL: https://jeroen.granary.dev/curl\n",
        );
        assert!(is_indexed(&record, "granary.dev"));
    }

    #[test]
    fn indexed_by_owner_match() {
        let mut record = src_record("jeroen", "Package: curl\nVersion: 1.0\n");
        record.owner = Some("jeroen".to_string());
        assert!(is_indexed(&record, "granary.dev"));

        record.owner = Some("somebody-else".to_string());
        assert!(!is_indexed(&record, "granary.dev"));
    }

    #[test]
    fn noindex_opts_out() {
        let record = src_record(
            "jeroen",
            "Package: curl\nVersion: 1.0\nNoindex: true\nURL: https://jeroen.granary.dev/curl\n",
        );
        assert!(!is_indexed(&record, "granary.dev"));
    }

    #[test]
    fn universes_dedup_case_insensitively() {
        let mut record = src_record(
            "jeroen",
            "Package: curl\nVersion: 1.0\nURL: https://github.com/Jeroen/curl\n",
        );
        record.indexed = true;
        record.maintainer.login = Some("Jeroen".to_string());
        assert_eq!(universes(&record), vec!["jeroen".to_string()]);
    }

    #[test]
    fn universes_include_maintainer_and_dev_owner() {
        let mut record = src_record(
            "rstudio",
            "Package: shiny\nVersion: 1.0\nURL: https://github.com/posit-dev/shiny\n",
        );
        record.indexed = true;
        record.maintainer.login = Some("wch".to_string());
        assert_eq!(
            universes(&record),
            vec![
                "rstudio".to_string(),
                "wch".to_string(),
                "posit-dev".to_string()
            ]
        );
    }

    #[test]
    fn score_base_is_one() {
        assert_eq!(ScoreSignals::default().score(), 1.0);
    }

    #[test]
    fn score_is_monotonic_in_every_signal() {
        let base = ScoreSignals {
            stars: 10,
            usedby: 2,
            searchresults: 50,
            vignettes: 1,
            datasets: 2,
            updates: 7,
            contributors: 4,
            on_archive: false,
            readme: false,
            downloads: 12_000,
            mentions: 3,
        };
        let reference = base.score();

        let bumps: Vec<ScoreSignals> = vec![
            ScoreSignals { stars: 100, ..base },
            ScoreSignals { usedby: 20, ..base },
            ScoreSignals { searchresults: 500, ..base },
            ScoreSignals { vignettes: 5, ..base },
            ScoreSignals { datasets: 9, ..base },
            ScoreSignals { updates: 70, ..base },
            ScoreSignals { contributors: 40, ..base },
            ScoreSignals { on_archive: true, ..base },
            ScoreSignals { readme: true, ..base },
            ScoreSignals { downloads: 1_000_000, ..base },
            ScoreSignals { mentions: 300, ..base },
        ];
        for bumped in bumps {
            assert!(
                bumped.score() >= reference,
                "score decreased: {bumped:?}"
            );
        }
    }

    #[test]
    fn mentions_saturate() {
        let low = ScoreSignals {
            mentions: MENTION_CAP,
            ..Default::default()
        };
        let high = ScoreSignals {
            mentions: MENTION_CAP * 100,
            ..Default::default()
        };
        assert_eq!(low.score(), high.score());
    }
}
