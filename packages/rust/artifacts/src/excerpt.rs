//! Whitespace collapsing and sentence-aware truncation.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Collapse every whitespace run to one space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Collapse whitespace, then cut to at most `budget` characters.
///
/// When the text is over budget, the cut lands just after the last period
/// inside the budget if that period sits past `min_offset` characters;
/// otherwise the text is hard-truncated at `budget`.
pub fn truncate_excerpt(text: &str, budget: usize, min_offset: usize) -> String {
    let text = collapse_whitespace(text);
    if text.chars().count() <= budget {
        return text;
    }

    let cut: String = text.chars().take(budget).collect();
    match cut.rfind('.') {
        Some(pos) if cut[..pos].chars().count() > min_offset => cut[..=pos].to_string(),
        _ => cut,
    }
}
