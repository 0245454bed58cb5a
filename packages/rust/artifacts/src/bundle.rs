//! Bundle packaging: four artifacts, their hashes and the bundle hash.
//!
//! The bundle hash is a two-level tree. The summary artifact lists the
//! digest, full and links-only hashes plus every unit hash; the bundle hash is
//! then taken over all four artifact hashes in the fixed order
//! digest, full, links-only, summary.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use hashstack_shared::{HashstackError, Result};

use crate::archive::{
    DIGEST_ENTRY, FULL_ENTRY, LINKS_ONLY_ENTRY, MANIFEST_ENTRY, SUMMARY_ENTRY, bundle_hash_entry,
    write_archive,
};
use crate::canonical::{Hashed, canonical_hash, hash_of_hashes, hash_text};
use crate::unit::{LinkRecord, Unit};

// ---------------------------------------------------------------------------
// Artifact records
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct FullArtifact<'a> {
    bundle_index: u32,
    units: &'a [Unit],
}

#[derive(Serialize)]
struct LinksOnlyArtifact<'a> {
    bundle_index: u32,
    links: Vec<UnitLinks<'a>>,
}

#[derive(Serialize)]
struct UnitLinks<'a> {
    unit_hash: &'a str,
    links: &'a [LinkRecord],
}

/// Hashes of the three content artifacts, as embedded in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashes {
    pub digest: String,
    pub full: String,
    pub links_only: String,
}

/// The summary artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryArtifact {
    pub bundle_index: u32,
    pub artifact_hashes: ContentHashes,
    pub unit_hashes: Vec<String>,
}

/// All four artifact hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHashes {
    pub digest: String,
    pub full: String,
    pub links_only: String,
    pub summary: String,
}

impl ArtifactHashes {
    /// The four hashes in bundle-hash order.
    pub fn ordered(&self) -> [&str; 4] {
        [&self.digest, &self.full, &self.links_only, &self.summary]
    }

    /// Hash of the four artifact hashes, newline-joined in order.
    pub fn bundle_hash(&self) -> String {
        hash_of_hashes(&self.ordered())
    }
}

/// The `hashes.json` manifest stored in each bundle archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub bundle_index: u32,
    pub artifact_hashes: ArtifactHashes,
    pub bundle_hash: String,
}

/// What a packaged bundle leaves behind for the layers above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSummary {
    pub bundle_index: u32,
    pub bundle_hash: String,
    pub artifact_hashes: ArtifactHashes,
    pub unit_hashes: Vec<String>,
    pub archive_path: PathBuf,
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Every entry of a bundle archive, fully rendered and hashed.
#[derive(Debug, Clone)]
pub struct RenderedBundle {
    pub bundle_index: u32,
    pub digest: Hashed,
    pub full: Hashed,
    pub links_only: Hashed,
    pub summary: Hashed,
    pub manifest: BundleManifest,
    pub unit_hashes: Vec<String>,
}

impl RenderedBundle {
    pub fn bundle_hash(&self) -> &str {
        &self.manifest.bundle_hash
    }

    /// Archive entries in write order.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![
            (DIGEST_ENTRY.to_string(), self.digest.text.clone()),
            (FULL_ENTRY.to_string(), self.full.text.clone()),
            (LINKS_ONLY_ENTRY.to_string(), self.links_only.text.clone()),
            (SUMMARY_ENTRY.to_string(), self.summary.text.clone()),
            (
                MANIFEST_ENTRY.to_string(),
                canonical_hash(&self.manifest)?.text,
            ),
            (
                bundle_hash_entry(self.bundle_index),
                self.manifest.bundle_hash.clone(),
            ),
        ])
    }
}

/// Markdown digest: one section per unit with its excerpts and tags.
pub fn render_digest(units: &[Unit], bundle_index: u32, created_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Bundle {bundle_index:04}");
    let _ = writeln!(
        out,
        "Created: {}",
        created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    for (i, unit) in units.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Unit {} (hash: {})", i + 1, unit.hash());
        let draft = unit.draft();
        if draft.snippets.is_empty() {
            let _ = writeln!(out, "_No sources retrieved._");
            continue;
        }
        for (j, snippet) in draft.snippets.iter().enumerate() {
            let tags = snippet
                .tags
                .iter()
                .map(|t| format!("{}:{}", t.family, t.color))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "- Source {}: {} | Tags: {tags}", j + 1, snippet.url);
            let _ = writeln!(out, "  {}", snippet.excerpt);
        }
    }
    out
}

/// Render and hash all four artifacts. Nothing is hashed until its text is complete.
pub fn render_bundle(
    units: &[Unit],
    bundle_index: u32,
    created_at: DateTime<Utc>,
) -> Result<RenderedBundle> {
    let digest = hash_text(render_digest(units, bundle_index, created_at));

    let full = canonical_hash(&FullArtifact {
        bundle_index,
        units,
    })?;

    let links_only = canonical_hash(&LinksOnlyArtifact {
        bundle_index,
        links: units
            .iter()
            .map(|u| UnitLinks {
                unit_hash: u.hash(),
                links: &u.draft().links,
            })
            .collect(),
    })?;

    let unit_hashes: Vec<String> = units.iter().map(|u| u.hash().to_string()).collect();
    let summary = canonical_hash(&SummaryArtifact {
        bundle_index,
        artifact_hashes: ContentHashes {
            digest: digest.hash.clone(),
            full: full.hash.clone(),
            links_only: links_only.hash.clone(),
        },
        unit_hashes: unit_hashes.clone(),
    })?;

    let artifact_hashes = ArtifactHashes {
        digest: digest.hash.clone(),
        full: full.hash.clone(),
        links_only: links_only.hash.clone(),
        summary: summary.hash.clone(),
    };
    let bundle_hash = artifact_hashes.bundle_hash();

    Ok(RenderedBundle {
        bundle_index,
        digest,
        full,
        links_only,
        summary,
        manifest: BundleManifest {
            bundle_index,
            artifact_hashes,
            bundle_hash,
        },
        unit_hashes,
    })
}

// ---------------------------------------------------------------------------
// Packaging
// ---------------------------------------------------------------------------

/// Package exactly `expected` units into a bundle archive at `archive_path`.
///
/// Any existing archive at the path is replaced.
#[instrument(skip_all, fields(bundle_index = bundle_index, units = units.len(), path = %archive_path.display()))]
pub fn package_bundle(
    units: Vec<Unit>,
    bundle_index: u32,
    expected: usize,
    created_at: DateTime<Utc>,
    archive_path: &Path,
) -> Result<BundleSummary> {
    if units.len() != expected {
        return Err(HashstackError::validation(format!(
            "bundle {bundle_index} needs {expected} units, got {}",
            units.len()
        )));
    }

    let rendered = render_bundle(&units, bundle_index, created_at)?;
    let entries = rendered.entries()?;
    if let Err(e) = write_archive(archive_path, &entries) {
        error!(error = %e, "bundle archive write failed");
        return Err(e);
    }

    info!(hash = %rendered.bundle_hash(), "bundle packaged");

    Ok(BundleSummary {
        bundle_index,
        bundle_hash: rendered.manifest.bundle_hash,
        artifact_hashes: rendered.manifest.artifact_hashes,
        unit_hashes: rendered.unit_hashes,
        archive_path: archive_path.to_path_buf(),
    })
}
