//! Unit records and the unit builder.
//!
//! A [`UnitDraft`] holds everything that is hashed. [`UnitDraft::finalize`]
//! consumes it into a [`Unit`] that carries the identity hash alongside, so the
//! hash can never include itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use hashstack_shared::{CategoryConfig, ExcerptConfig, FetchBatch, HashstackError, Result};

use crate::canonical::canonical_hash;
use crate::classify::{Classifier, Tag};
use crate::excerpt::{collapse_whitespace, truncate_excerpt};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One source's excerpt with its tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetRecord {
    pub url: String,
    pub excerpt: String,
    pub tags: Vec<Tag>,
}

/// Compact (locator, short excerpt) pair for links-only views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub url: String,
    pub excerpt: String,
}

/// The hashed portion of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDraft {
    pub created_at_utc: DateTime<Utc>,
    pub source_count_requested: usize,
    pub source_count_actual: usize,
    pub snippets: Vec<SnippetRecord>,
    pub links: Vec<LinkRecord>,
}

impl UnitDraft {
    /// Hash the canonical serialization and wrap the draft with it.
    pub fn finalize(self) -> Result<Unit> {
        if self.source_count_actual > self.source_count_requested {
            return Err(HashstackError::validation(format!(
                "unit has {} sources but only {} were requested",
                self.source_count_actual, self.source_count_requested
            )));
        }

        let hash = canonical_hash(&self)?.hash;
        Ok(Unit {
            draft: self,
            unit_hash: hash.clone(),
            value: hash,
        })
    }
}

/// A finalized unit: the draft plus its identity hash.
///
/// `value` always equals `unit_hash`; both are excluded from the hashed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    #[serde(flatten)]
    draft: UnitDraft,
    unit_hash: String,
    value: String,
}

impl Unit {
    pub fn hash(&self) -> &str {
        &self.unit_hash
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn draft(&self) -> &UnitDraft {
        &self.draft
    }

    /// Requested sample size.
    pub fn requested(&self) -> usize {
        self.draft.source_count_requested
    }

    /// Sources that produced an excerpt.
    pub fn actual(&self) -> usize {
        self.draft.source_count_actual
    }

    /// Recompute the identity hash from the draft and compare.
    pub fn is_consistent(&self) -> Result<bool> {
        let recomputed = canonical_hash(&self.draft)?.hash;
        Ok(recomputed == self.unit_hash && self.value == self.unit_hash)
    }
}

// ---------------------------------------------------------------------------
// UnitBuilder
// ---------------------------------------------------------------------------

/// Turns one fetch batch into a finalized unit.
pub struct UnitBuilder {
    classifier: Classifier,
    excerpt: ExcerptConfig,
}

impl UnitBuilder {
    pub fn new(categories: &[CategoryConfig], excerpt: ExcerptConfig) -> Result<Self> {
        Ok(Self {
            classifier: Classifier::new(categories)?,
            excerpt,
        })
    }

    /// Build the unhashed record. Spans are kept in the order given.
    pub fn draft(&self, batch: &FetchBatch, created_at: DateTime<Utc>) -> UnitDraft {
        let mut snippets = Vec::with_capacity(batch.spans.len());
        let mut links = Vec::with_capacity(batch.spans.len());

        for span in &batch.spans {
            if collapse_whitespace(&span.text).is_empty() {
                continue;
            }

            let excerpt = truncate_excerpt(
                &span.text,
                self.excerpt.max_chars,
                self.excerpt.min_sentence_offset,
            );
            let tags = self.classifier.classify(&excerpt);

            snippets.push(SnippetRecord {
                url: span.locator.to_string(),
                excerpt,
                tags,
            });
            links.push(LinkRecord {
                url: span.locator.to_string(),
                excerpt: truncate_excerpt(
                    &span.text,
                    self.excerpt.link_chars,
                    self.excerpt.min_sentence_offset,
                ),
            });
        }

        UnitDraft {
            created_at_utc: created_at,
            source_count_requested: batch.requested,
            source_count_actual: snippets.len(),
            snippets,
            links,
        }
    }

    /// Build, hash and finalize a unit.
    #[instrument(skip_all, fields(requested = batch.requested, fetched = batch.actual()))]
    pub fn build(&self, batch: &FetchBatch, created_at: DateTime<Utc>) -> Result<Unit> {
        let unit = self.draft(batch, created_at).finalize()?;
        debug!(hash = %unit.hash(), actual = unit.actual(), "unit built");
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hashstack_shared::{AppConfig, SourceSpan};
    use url::Url;

    fn builder() -> UnitBuilder {
        let config = AppConfig::default();
        UnitBuilder::new(&config.categories, config.excerpt).unwrap()
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
    }

    fn span(host: &str, text: &str) -> SourceSpan {
        SourceSpan {
            locator: Url::parse(&format!("https://{host}/")).unwrap(),
            text: text.into(),
        }
    }

    fn batch(spans: Vec<SourceSpan>, requested: usize) -> FetchBatch {
        FetchBatch { requested, spans }
    }

    #[test]
    fn hash_excludes_identity_fields() {
        let unit = builder()
            .build(&batch(vec![span("a.example", "Research   data.")], 2), fixed_time())
            .unwrap();

        let expected = canonical_hash(unit.draft()).unwrap().hash;
        assert_eq!(unit.hash(), expected);
        assert_eq!(unit.value(), unit.hash());
        assert!(unit.is_consistent().unwrap());

        let draft_json = serde_json::to_string(unit.draft()).unwrap();
        assert!(!draft_json.contains("unit_hash"));
    }

    #[test]
    fn identical_inputs_hash_identically() {
        let spans = vec![span("a.example", "First text."), span("b.example", "Second text.")];
        let one = builder().build(&batch(spans.clone(), 3), fixed_time()).unwrap();
        let two = builder().build(&batch(spans, 3), fixed_time()).unwrap();
        assert_eq!(one.hash(), two.hash());
    }

    #[test]
    fn span_order_changes_hash() {
        let a = span("a.example", "First text.");
        let b = span("b.example", "Second text.");
        let forward = builder()
            .build(&batch(vec![a.clone(), b.clone()], 2), fixed_time())
            .unwrap();
        let reverse = builder().build(&batch(vec![b, a], 2), fixed_time()).unwrap();
        assert_ne!(forward.hash(), reverse.hash());
    }

    #[test]
    fn counts_and_parallel_lists() {
        let spans = vec![
            span("a.example", "Market growth."),
            span("b.example", "   \n  "),
            span("c.example", &"word ".repeat(200)),
        ];
        let unit = builder().build(&batch(spans, 5), fixed_time()).unwrap();

        assert_eq!(unit.requested(), 5);
        assert_eq!(unit.actual(), 2);
        let draft = unit.draft();
        assert_eq!(draft.snippets.len(), draft.links.len());
        assert_eq!(draft.snippets[0].tags[0].family, "economy");
        assert!(draft.snippets[1].excerpt.chars().count() <= 600);
        assert!(draft.links[1].excerpt.chars().count() <= 280);
    }

    #[test]
    fn empty_batch_still_hashes() {
        let unit = builder().build(&batch(vec![], 12), fixed_time()).unwrap();
        assert_eq!(unit.actual(), 0);
        assert_eq!(unit.hash().len(), 64);
    }

    #[test]
    fn actual_above_requested_is_rejected() {
        let result = builder().build(&batch(vec![span("a.example", "text")], 0), fixed_time());
        assert!(result.is_err());
    }

    #[test]
    fn unit_roundtrips_through_json() {
        let unit = builder()
            .build(&batch(vec![span("a.example", "Health policy.")], 1), fixed_time())
            .unwrap();
        let json = serde_json::to_string_pretty(&unit).unwrap();
        assert!(json.contains("\"unit_hash\""));
        assert!(json.contains("\"value\""));

        let parsed: Unit = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, unit);
        assert!(parsed.is_consistent().unwrap());
    }
}
