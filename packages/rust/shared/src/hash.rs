//! SHA-256 helpers and the hash colour marker.

use sha2::{Digest, Sha256};

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    format!("{:x}", hasher.finalize())
}

/// Operator-facing colour derived from the last hex character of a hash.
///
/// Only digits carry a colour; `a`–`f` land in [`HashColor::Unclassified`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashColor {
    Blue,
    Green,
    Yellow,
    Orange,
    Red,
    Pink,
    Unclassified,
}

impl HashColor {
    pub fn from_hash(hash: &str) -> Self {
        match hash.chars().last() {
            Some('0') => Self::Blue,
            Some('1' | '2') => Self::Green,
            Some('3' | '4') => Self::Yellow,
            Some('5' | '6') => Self::Orange,
            Some('7' | '8') => Self::Red,
            Some('9') => Self::Pink,
            _ => Self::Unclassified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Red => "red",
            Self::Pink => "pink",
            Self::Unclassified => "unclassified",
        }
    }
}

impl std::fmt::Display for HashColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let hash = sha256_hex("hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn digit_suffixes_map_to_colours() {
        assert_eq!(HashColor::from_hash("ab0"), HashColor::Blue);
        assert_eq!(HashColor::from_hash("ab2"), HashColor::Green);
        assert_eq!(HashColor::from_hash("ab3"), HashColor::Yellow);
        assert_eq!(HashColor::from_hash("ab6"), HashColor::Orange);
        assert_eq!(HashColor::from_hash("ab7"), HashColor::Red);
        assert_eq!(HashColor::from_hash("ab9"), HashColor::Pink);
    }

    #[test]
    fn hex_letter_suffix_is_unclassified() {
        for suffix in ['a', 'b', 'c', 'd', 'e', 'f'] {
            let hash = format!("0123{suffix}");
            assert_eq!(HashColor::from_hash(&hash), HashColor::Unclassified);
        }
        assert_eq!(HashColor::from_hash(""), HashColor::Unclassified);
        assert_eq!(HashColor::Unclassified.to_string(), "unclassified");
    }
}
