//! Core domain types passed between the fetch and build stages.

use url::Url;

// ---------------------------------------------------------------------------
// SourceSpan
// ---------------------------------------------------------------------------

/// A source reference: the locator plus the raw text extracted from it.
/// Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    /// Where the text came from.
    pub locator: Url,
    /// Primary text region of the fetched document.
    pub text: String,
}

// ---------------------------------------------------------------------------
// FetchBatch
// ---------------------------------------------------------------------------

/// The outcome of one unit's fetch batch.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    /// Number of locators selected (`min(k, |pool|)`).
    pub requested: usize,
    /// Non-empty results in completion order.
    pub spans: Vec<SourceSpan>,
}

impl FetchBatch {
    /// Number of locators that yielded text.
    pub fn actual(&self) -> usize {
        self.spans.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actual_counts_spans() {
        let batch = FetchBatch {
            requested: 3,
            spans: vec![SourceSpan {
                locator: Url::parse("https://example.com/").unwrap(),
                text: "text".into(),
            }],
        };
        assert_eq!(batch.actual(), 1);
        assert!(batch.actual() <= batch.requested);
    }
}
