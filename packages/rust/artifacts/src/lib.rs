//! Content-addressed artifacts for hashstack.
//!
//! Three nested layers, each with one hash attesting to everything below:
//! - [`Unit`]: excerpts from one fetch batch, built by [`UnitBuilder`]
//! - bundle: a fixed count of units plus four artifacts ([`package_bundle`])
//! - super-bundle: a fixed count of bundle hashes ([`package_super_bundle`])
//!
//! All hashed records go through [`canonical`] serialization. Archives are
//! zip files written atomically and checked with [`verify_archive`].

pub mod archive;
pub mod bundle;
pub mod canonical;
pub mod classify;
pub mod excerpt;
pub mod super_bundle;
pub mod unit;
pub mod verify;

pub use archive::{
    bundle_archive_path, latest_super_index, read_archive_entries, super_archive_path,
    write_archive,
};
pub use bundle::{
    ArtifactHashes, BundleManifest, BundleSummary, RenderedBundle, package_bundle, render_bundle,
};
pub use canonical::{Hashed, canonical_hash, hash_of_hashes, to_canonical_json};
pub use classify::{Classifier, Tag};
pub use excerpt::{collapse_whitespace, truncate_excerpt};
pub use super_bundle::{
    SuperBundleSummary, SuperIndex, package_super_bundle, render_super_bundle,
};
pub use unit::{LinkRecord, SnippetRecord, Unit, UnitBuilder, UnitDraft};
pub use verify::{HashMismatch, VerifyReport, verify_archive, verify_bundle_archive, verify_super_archive};
