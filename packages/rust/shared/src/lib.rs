//! Shared error model, configuration, and hash helpers for hashstack.
//!
//! This crate is the foundation depended on by all other hashstack crates.
//! It provides:
//! - [`HashstackError`]: the unified error type
//! - Configuration ([`AppConfig`] and the runtime value objects derived from it)
//! - Hash primitives ([`sha256_hex`], [`HashColor`])
//! - Domain types handed from fetch to build ([`SourceSpan`], [`FetchBatch`])

pub mod config;
pub mod error;
pub mod hash;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ArchiveConfig, BatchConfig, CategoryConfig, ExcerptConfig, FetchConfig, FetchMode,
    PublishConfig, SamplingConfig, config_dir, config_file_path, init_config, init_config_at,
    load_config, load_config_from,
};
pub use error::{HashstackError, Result};
pub use hash::{HashColor, sha256_hex};
pub use types::{FetchBatch, SourceSpan};
