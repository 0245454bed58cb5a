//! Super-bundle packaging: the index of bundle summaries and the super hash.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use hashstack_shared::{HashstackError, Result};

use crate::archive::{SUPER_HASH_ENTRY, SUPER_INDEX_ENTRY, write_archive};
use crate::bundle::{ArtifactHashes, BundleSummary};
use crate::canonical::{Hashed, canonical_hash, hash_of_hashes};

/// One bundle as listed in the super-bundle index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedBundle {
    pub bundle_index: u32,
    pub bundle_hash: String,
    pub artifact_hashes: ArtifactHashes,
}

/// The `index.json` entry of a super-bundle archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperIndex {
    pub super_index: u32,
    pub created_at_utc: DateTime<Utc>,
    pub bundles: Vec<IndexedBundle>,
}

impl SuperIndex {
    /// Hash of the newline-joined bundle hashes, in listed order.
    pub fn super_hash(&self) -> String {
        let hashes: Vec<&str> = self.bundles.iter().map(|b| b.bundle_hash.as_str()).collect();
        hash_of_hashes(&hashes)
    }
}

/// The publishable result of a super-bundle build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBundleSummary {
    pub super_index: u32,
    pub super_hash: String,
    pub bundle_hashes: Vec<String>,
    pub archive_path: PathBuf,
}

/// Rendered super-bundle entries.
#[derive(Debug, Clone)]
pub struct RenderedSuperBundle {
    pub index: SuperIndex,
    pub index_text: Hashed,
    pub super_hash: String,
}

impl RenderedSuperBundle {
    pub fn entries(&self) -> Vec<(String, String)> {
        vec![
            (SUPER_INDEX_ENTRY.to_string(), self.index_text.text.clone()),
            (SUPER_HASH_ENTRY.to_string(), self.super_hash.clone()),
        ]
    }
}

/// Render the index for `bundles` in the order received.
pub fn render_super_bundle(
    bundles: &[BundleSummary],
    super_index: u32,
    created_at: DateTime<Utc>,
) -> Result<RenderedSuperBundle> {
    let index = SuperIndex {
        super_index,
        created_at_utc: created_at,
        bundles: bundles
            .iter()
            .map(|b| IndexedBundle {
                bundle_index: b.bundle_index,
                bundle_hash: b.bundle_hash.clone(),
                artifact_hashes: b.artifact_hashes.clone(),
            })
            .collect(),
    };
    let index_text = canonical_hash(&index)?;
    let super_hash = index.super_hash();

    Ok(RenderedSuperBundle {
        index,
        index_text,
        super_hash,
    })
}

/// Package exactly `expected` bundle summaries into a super-bundle archive.
#[instrument(skip_all, fields(super_index = super_index, bundles = bundles.len(), path = %archive_path.display()))]
pub fn package_super_bundle(
    bundles: Vec<BundleSummary>,
    super_index: u32,
    expected: usize,
    created_at: DateTime<Utc>,
    archive_path: &Path,
) -> Result<SuperBundleSummary> {
    if bundles.len() != expected {
        return Err(HashstackError::validation(format!(
            "super-bundle {super_index} needs {expected} bundles, got {}",
            bundles.len()
        )));
    }

    let rendered = render_super_bundle(&bundles, super_index, created_at)?;
    if let Err(e) = write_archive(archive_path, &rendered.entries()) {
        error!(error = %e, "super-bundle archive write failed");
        return Err(e);
    }

    info!(hash = %rendered.super_hash, "super-bundle packaged");

    Ok(SuperBundleSummary {
        super_index,
        super_hash: rendered.super_hash,
        bundle_hashes: bundles.into_iter().map(|b| b.bundle_hash).collect(),
        archive_path: archive_path.to_path_buf(),
    })
}
