//! Zip archive IO and archive naming.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;

use hashstack_shared::{HashstackError, Result};

pub const DIGEST_ENTRY: &str = "digest.md";
pub const FULL_ENTRY: &str = "full.json";
pub const LINKS_ONLY_ENTRY: &str = "links_only.json";
pub const SUMMARY_ENTRY: &str = "summary.json";
pub const MANIFEST_ENTRY: &str = "hashes.json";
pub const SUPER_INDEX_ENTRY: &str = "index.json";
pub const SUPER_HASH_ENTRY: &str = "super_bundle.txt";

/// Plaintext bundle hash entry, e.g. `bundle_0007.txt`.
pub fn bundle_hash_entry(bundle_index: u32) -> String {
    format!("bundle_{bundle_index:04}.txt")
}

/// `bundle_<index:04>_<units>.zip` under `dir`.
pub fn bundle_archive_path(dir: &Path, bundle_index: u32, units: usize) -> PathBuf {
    dir.join(format!("bundle_{bundle_index:04}_{units}.zip"))
}

/// `super_<index:04>_<bundles>.zip` under `dir`.
pub fn super_archive_path(dir: &Path, super_index: u32, bundles: usize) -> PathBuf {
    dir.join(format!("super_{super_index:04}_{bundles}.zip"))
}

/// Highest super-bundle index already written to `dir`, if any.
pub fn latest_super_index(dir: &Path) -> Result<Option<u32>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(HashstackError::io(dir, e)),
    };

    let mut latest = None;
    for entry in entries {
        let entry = entry.map_err(|e| HashstackError::io(dir, e))?;
        let name = entry.file_name();
        let Some(index) = name.to_str().and_then(parse_super_index) else {
            continue;
        };
        latest = latest.max(Some(index));
    }
    Ok(latest)
}

fn parse_super_index(file_name: &str) -> Option<u32> {
    let stem = file_name.strip_prefix("super_")?.strip_suffix(".zip")?;
    let (index, _bundles) = stem.split_once('_')?;
    index.parse().ok()
}

/// Write `entries` into a zip at `path`, replacing any existing archive.
///
/// The archive is built in a hidden sibling temp file and renamed into place.
/// On failure the temp file is removed and the target is left untouched.
pub fn write_archive(path: &Path, entries: &[(String, String)]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| HashstackError::archive(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(dir).map_err(|e| HashstackError::io(dir, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| HashstackError::archive(format!("{} has no file name", path.display())))?;
    let temp = dir.join(format!(".{file_name}.tmp"));

    if let Err(e) = write_zip(&temp, entries) {
        let _ = std::fs::remove_file(&temp);
        return Err(e);
    }

    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        HashstackError::io(path, e)
    })?;

    debug!(path = %path.display(), entries = entries.len(), "wrote archive");
    Ok(())
}

fn write_zip(temp: &Path, entries: &[(String, String)]) -> Result<()> {
    let file = std::fs::File::create(temp).map_err(|e| HashstackError::io(temp, e))?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(name.as_str(), options)
            .map_err(|e| HashstackError::archive(format!("start entry {name}: {e}")))?;
        zip.write_all(content.as_bytes())
            .map_err(|e| HashstackError::io(temp, e))?;
    }

    let file = zip
        .finish()
        .map_err(|e| HashstackError::archive(format!("finish {}: {e}", temp.display())))?;
    file.sync_all().map_err(|e| HashstackError::io(temp, e))?;
    Ok(())
}

/// Read every entry of the zip at `path` into memory, keyed by entry name.
pub fn read_archive_entries(path: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let file = std::fs::File::open(path).map_err(|e| HashstackError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| HashstackError::archive(format!("open {}: {e}", path.display())))?;

    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| HashstackError::archive(format!("entry {i} of {}: {e}", path.display())))?;
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| HashstackError::io(path, e))?;
        entries.insert(entry.name().to_string(), bytes);
    }
    Ok(entries)
}
