//! Canonical serialization and hashing.
//!
//! Every hashed record goes through [`to_canonical_json`]: pretty-printed JSON
//! with two-space indentation, keys in struct declaration order, non-ASCII
//! written as raw UTF-8. Records only use structs, `Vec`s and `BTreeMap`s, so
//! the output is byte-stable for equal values.

use serde::Serialize;

use hashstack_shared::{Result, sha256_hex};

/// A canonical text and the SHA-256 of its UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hashed {
    pub text: String,
    pub hash: String,
}

/// Serialize `value` to its canonical text.
pub fn to_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Serialize `value` canonically and hash the result.
///
/// Serialization completes before hashing starts, so a failure never yields a
/// hash of partial output.
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> Result<Hashed> {
    let text = to_canonical_json(value)?;
    let hash = sha256_hex(&text);
    Ok(Hashed { text, hash })
}

/// Hash already-rendered text (used for the markdown digest).
pub fn hash_text(text: String) -> Hashed {
    let hash = sha256_hex(&text);
    Hashed { text, hash }
}

/// Hash an ordered list of hashes joined by newlines.
pub fn hash_of_hashes<S: AsRef<str>>(hashes: &[S]) -> String {
    let joined = hashes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");
    sha256_hex(joined)
}
