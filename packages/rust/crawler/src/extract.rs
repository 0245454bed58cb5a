//! Primary text extraction.
//!
//! Tries a dedicated `<article>`, then `<main>`, then `<body>`, and finally the
//! whole document. Script-like elements never contribute text.

use scraper::{ElementRef, Html, Node, Selector};

/// Regions tried in priority order before falling back to the whole document.
const PRIMARY_REGIONS: [&str; 3] = ["article", "main", "body"];

/// Elements whose text is never part of an excerpt.
const SILENT_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Reduce an HTML document to one text span. Returns an empty string when the
/// document carries no visible text.
pub fn extract_primary_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    for region in PRIMARY_REGIONS {
        let sel = Selector::parse(region).expect("static selector");
        if let Some(el) = doc.select(&sel).next() {
            let text = element_text(el);
            if !text.is_empty() {
                return text;
            }
        }
    }

    element_text(doc.root_element())
}

/// Visible text of `el`, pieces trimmed and joined with single spaces.
fn element_text(el: ElementRef<'_>) -> String {
    let mut pieces: Vec<&str> = Vec::new();

    for node in el.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let silenced = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| SILENT_ELEMENTS.contains(&e.name()))
        });
        if silenced {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed);
        }
    }

    pieces.join(" ")
}
