//! Re-derive stored hashes from archive bytes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{info, instrument, warn};

use hashstack_shared::{HashstackError, Result, sha256_hex};

use crate::archive::{
    DIGEST_ENTRY, FULL_ENTRY, LINKS_ONLY_ENTRY, MANIFEST_ENTRY, SUMMARY_ENTRY, SUPER_HASH_ENTRY,
    SUPER_INDEX_ENTRY, bundle_hash_entry, read_archive_entries,
};
use crate::bundle::{ArtifactHashes, BundleManifest, SummaryArtifact};
use crate::super_bundle::SuperIndex;

/// A stored hash that disagrees with the one recomputed from archive bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashMismatch {
    pub item: String,
    pub stored: String,
    pub computed: String,
}

/// Result of checking one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// `bundle` or `super`.
    pub kind: &'static str,
    pub index: u32,
    /// The top-level hash recomputed from the archive content.
    pub hash: String,
    pub mismatches: Vec<HashMismatch>,
}

impl VerifyReport {
    pub fn is_valid(&self) -> bool {
        self.mismatches.is_empty()
    }
}

fn entry<'a>(entries: &'a BTreeMap<String, Vec<u8>>, name: &str, path: &Path) -> Result<&'a [u8]> {
    entries.get(name).map(Vec::as_slice).ok_or_else(|| {
        HashstackError::archive(format!("{} is missing entry {name}", path.display()))
    })
}

fn entry_text<'a>(
    entries: &'a BTreeMap<String, Vec<u8>>,
    name: &str,
    path: &Path,
) -> Result<&'a str> {
    std::str::from_utf8(entry(entries, name, path)?)
        .map_err(|e| HashstackError::parse(format!("{name} is not UTF-8: {e}")))
}

fn compare(mismatches: &mut Vec<HashMismatch>, item: &str, stored: &str, computed: &str) {
    if stored.trim() != computed {
        mismatches.push(HashMismatch {
            item: item.to_string(),
            stored: stored.trim().to_string(),
            computed: computed.to_string(),
        });
    }
}

/// Recompute every artifact hash and the bundle hash of a bundle archive and
/// compare them against the manifest, the summary and the plaintext hash entry.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn verify_bundle_archive(path: &Path) -> Result<VerifyReport> {
    let entries = read_archive_entries(path)?;

    let manifest: BundleManifest = serde_json::from_slice(entry(&entries, MANIFEST_ENTRY, path)?)
        .map_err(|e| HashstackError::parse(format!("{MANIFEST_ENTRY}: {e}")))?;
    let summary_bytes = entry(&entries, SUMMARY_ENTRY, path)?;
    let summary: SummaryArtifact = serde_json::from_slice(summary_bytes)
        .map_err(|e| HashstackError::parse(format!("{SUMMARY_ENTRY}: {e}")))?;

    let computed = ArtifactHashes {
        digest: sha256_hex(entry(&entries, DIGEST_ENTRY, path)?),
        full: sha256_hex(entry(&entries, FULL_ENTRY, path)?),
        links_only: sha256_hex(entry(&entries, LINKS_ONLY_ENTRY, path)?),
        summary: sha256_hex(summary_bytes),
    };
    let bundle_hash = computed.bundle_hash();

    let stored = &manifest.artifact_hashes;
    let mut mismatches = Vec::new();
    compare(&mut mismatches, DIGEST_ENTRY, &stored.digest, &computed.digest);
    compare(&mut mismatches, FULL_ENTRY, &stored.full, &computed.full);
    compare(&mut mismatches, LINKS_ONLY_ENTRY, &stored.links_only, &computed.links_only);
    compare(&mut mismatches, SUMMARY_ENTRY, &stored.summary, &computed.summary);

    let embedded = &summary.artifact_hashes;
    compare(&mut mismatches, "summary.digest", &embedded.digest, &computed.digest);
    compare(&mut mismatches, "summary.full", &embedded.full, &computed.full);
    compare(&mut mismatches, "summary.links_only", &embedded.links_only, &computed.links_only);

    compare(&mut mismatches, "bundle_hash", &manifest.bundle_hash, &bundle_hash);
    let hash_entry = bundle_hash_entry(manifest.bundle_index);
    compare(
        &mut mismatches,
        &hash_entry,
        entry_text(&entries, &hash_entry, path)?,
        &bundle_hash,
    );

    if mismatches.is_empty() {
        info!(hash = %bundle_hash, "bundle archive verified");
    } else {
        warn!(count = mismatches.len(), "bundle archive has hash mismatches");
    }

    Ok(VerifyReport {
        kind: "bundle",
        index: manifest.bundle_index,
        hash: bundle_hash,
        mismatches,
    })
}

/// Recompute the super hash from the stored index and compare it with the
/// plaintext hash entry.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn verify_super_archive(path: &Path) -> Result<VerifyReport> {
    let entries = read_archive_entries(path)?;

    let index: SuperIndex = serde_json::from_slice(entry(&entries, SUPER_INDEX_ENTRY, path)?)
        .map_err(|e| HashstackError::parse(format!("{SUPER_INDEX_ENTRY}: {e}")))?;
    let super_hash = index.super_hash();

    let mut mismatches = Vec::new();
    for bundle in &index.bundles {
        compare(
            &mut mismatches,
            &format!("bundle_{:04}", bundle.bundle_index),
            &bundle.bundle_hash,
            &bundle.artifact_hashes.bundle_hash(),
        );
    }
    compare(
        &mut mismatches,
        SUPER_HASH_ENTRY,
        entry_text(&entries, SUPER_HASH_ENTRY, path)?,
        &super_hash,
    );

    if mismatches.is_empty() {
        info!(hash = %super_hash, "super archive verified");
    } else {
        warn!(count = mismatches.len(), "super archive has hash mismatches");
    }

    Ok(VerifyReport {
        kind: "super",
        index: index.super_index,
        hash: super_hash,
        mismatches,
    })
}

/// Verify either archive kind, chosen by its entries.
pub fn verify_archive(path: &Path) -> Result<VerifyReport> {
    let entries = read_archive_entries(path)?;
    if entries.contains_key(SUPER_INDEX_ENTRY) {
        verify_super_archive(path)
    } else if entries.contains_key(MANIFEST_ENTRY) {
        verify_bundle_archive(path)
    } else {
        Err(HashstackError::archive(format!(
            "{} is neither a bundle nor a super-bundle archive",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::write_archive;
    use crate::bundle::package_bundle;
    use crate::super_bundle::package_super_bundle;
    use crate::unit::{Unit, UnitBuilder};
    use chrono::{DateTime, TimeZone, Utc};
    use hashstack_shared::{AppConfig, FetchBatch, SourceSpan};
    use std::path::PathBuf;
    use url::Url;
    use uuid::Uuid;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 2, 2, 2, 2).unwrap()
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hashstack-verify-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn units(count: usize, tag: &str) -> Vec<Unit> {
        let config = AppConfig::default();
        let builder = UnitBuilder::new(&config.categories, config.excerpt).unwrap();
        (0..count)
            .map(|i| {
                let batch = FetchBatch {
                    requested: 1,
                    spans: vec![SourceSpan {
                        locator: Url::parse(&format!("https://{tag}{i}.example/")).unwrap(),
                        text: format!("Experiment {i} on {tag} society data."),
                    }],
                };
                builder.build(&batch, fixed_time()).unwrap()
            })
            .collect()
    }

    #[test]
    fn packaged_bundle_verifies() {
        let tmp = temp_dir();
        let path = tmp.join("bundle_0001_2.zip");
        let summary = package_bundle(units(2, "a"), 1, 2, fixed_time(), &path).unwrap();

        let report = verify_bundle_archive(&path).unwrap();
        assert!(report.is_valid(), "{:?}", report.mismatches);
        assert_eq!(report.hash, summary.bundle_hash);
        assert_eq!(report.index, 1);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn tampering_any_artifact_changes_only_its_hash() {
        let artifacts = [DIGEST_ENTRY, FULL_ENTRY, LINKS_ONLY_ENTRY, SUMMARY_ENTRY];
        let tmp = temp_dir();

        for target in artifacts {
            let path = tmp.join(format!("bundle_0001_2_{target}.zip"));
            package_bundle(units(2, "b"), 1, 2, fixed_time(), &path).unwrap();

            let mut entries: Vec<(String, String)> = read_archive_entries(&path)
                .unwrap()
                .into_iter()
                .map(|(k, v)| (k, String::from_utf8(v).unwrap()))
                .collect();
            for (name, text) in &mut entries {
                if name.as_str() == target {
                    text.push(' ');
                }
            }
            write_archive(&path, &entries).unwrap();

            let report = verify_bundle_archive(&path).unwrap();
            let items: Vec<&str> = report.mismatches.iter().map(|m| m.item.as_str()).collect();
            assert!(items.contains(&target), "{target}: {items:?}");
            assert!(items.contains(&"bundle_hash"), "{target}: {items:?}");
            for other in artifacts.iter().filter(|a| **a != target) {
                assert!(!items.contains(other), "{target} also changed {other}: {items:?}");
                let stem = other.trim_end_matches(".json").trim_end_matches(".md");
                let embedded = format!("summary.{stem}");
                assert!(!items.contains(&embedded.as_str()), "{target}: {items:?}");
            }
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn packaged_super_bundle_verifies() {
        let tmp = temp_dir();
        let mut summaries = Vec::new();
        for i in 1..=2u32 {
            let path = tmp.join(format!("bundle_{i:04}_1.zip"));
            summaries.push(package_bundle(units(1, "c"), i, 1, fixed_time(), &path).unwrap());
        }
        let path = tmp.join("super_0001_2.zip");
        let packaged = package_super_bundle(summaries, 1, 2, fixed_time(), &path).unwrap();

        let report = verify_archive(&path).unwrap();
        assert_eq!(report.kind, "super");
        assert!(report.is_valid());
        assert_eq!(report.hash, packaged.super_hash);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_entries_are_errors() {
        let tmp = temp_dir();
        let path = tmp.join("odd.zip");
        write_archive(&path, &[("readme.txt".to_string(), "hi".to_string())]).unwrap();

        assert!(verify_archive(&path).is_err());
        assert!(verify_bundle_archive(&path).is_err());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
