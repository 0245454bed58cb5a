//! Error types for hashstack.
//!
//! Library crates use [`HashstackError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Fetch failures never surface as this type: the fetch boundary reports
//! failure as an empty text span instead.

use std::path::PathBuf;

/// Top-level error type for all hashstack operations.
#[derive(Debug, thiserror::Error)]
pub enum HashstackError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP setup error (client construction, not individual fetches).
    #[error("network error: {0}")]
    Network(String),

    /// Parsing of stored artifacts or manifests failed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Canonical serialization of a record failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Archive creation or reading failed.
    #[error("archive error: {0}")]
    Archive(String),

    /// Input validation error (wrong batch size, hash mismatch, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// One step of the external publish collaborator failed.
    #[error("publish error during {step}: {message}")]
    Publish { step: String, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HashstackError>;

impl HashstackError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an archive error from any displayable message.
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a publish error naming the failing step (`add`, `commit`, `push`, ...).
    pub fn publish(step: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Publish {
            step: step.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for HashstackError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
