//! Tagging excerpts against ordered labeled pattern groups.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use hashstack_shared::{CategoryConfig, HashstackError, Result};

/// Family written when no group matches.
pub const UNCLASSIFIED_FAMILY: &str = "unclassified";

/// Colour written when no group matches.
pub const UNCLASSIFIED_COLOR: &str = "gray";

/// One group's verdict on an excerpt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub family: String,
    pub color: String,
    /// The pattern that matched; `None` for the unclassified tag.
    pub pattern: Option<String>,
}

impl Tag {
    fn unclassified() -> Self {
        Self {
            family: UNCLASSIFIED_FAMILY.into(),
            color: UNCLASSIFIED_COLOR.into(),
            pattern: None,
        }
    }
}

struct PatternGroup {
    name: String,
    color: String,
    patterns: Vec<(String, Regex)>,
}

/// Compiled pattern groups, in configuration order.
pub struct Classifier {
    groups: Vec<PatternGroup>,
}

impl Classifier {
    /// Compile every group's patterns case-insensitively.
    pub fn new(categories: &[CategoryConfig]) -> Result<Self> {
        let groups = categories
            .iter()
            .map(|category| {
                let patterns = category
                    .patterns
                    .iter()
                    .map(|p| {
                        RegexBuilder::new(p)
                            .case_insensitive(true)
                            .build()
                            .map(|re| (p.clone(), re))
                            .map_err(|e| {
                                HashstackError::config(format!(
                                    "category '{}' has invalid pattern '{p}': {e}",
                                    category.name
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(PatternGroup {
                    name: category.name.clone(),
                    color: category.color.clone(),
                    patterns,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { groups })
    }

    /// Tag `excerpt`: at most one tag per group (its first matching pattern),
    /// or a single unclassified tag when nothing matches.
    pub fn classify(&self, excerpt: &str) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .groups
            .iter()
            .filter_map(|group| {
                group
                    .patterns
                    .iter()
                    .find(|(_, re)| re.is_match(excerpt))
                    .map(|(pattern, _)| Tag {
                        family: group.name.clone(),
                        color: group.color.clone(),
                        pattern: Some(pattern.clone()),
                    })
            })
            .collect();

        if tags.is_empty() {
            tags.push(Tag::unclassified());
        }
        tags
    }
}
