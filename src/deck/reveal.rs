//! Reveal export pipeline — deck document to renderer-ready slide records.
//!
//! DESIGN
//! ======
//! A pure transform, recomputed on every export/present request and never
//! persisted. Each page is flattened to HTML, its `<style>` blocks are pulled
//! out into a CSS list, the slide-container envelope is unwrapped (capturing
//! the container's inline style), and container-sizing rules targeting bare
//! `body`/`html` are filtered out — those only make sense inside the editor's
//! own canvas. A malformed page degrades to an empty slide; it never aborts
//! the rest of the deck.

use std::sync::OnceLock;

use regex::Regex;

use super::container;
use super::document::DeckDocument;
use super::html;

// =============================================================================
// TYPES
// =============================================================================

/// The exported, renderer-ready form of one page. Derived, never persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RevealSlide {
    pub name: String,
    pub html: String,
    pub css: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_style: Option<String>,
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Transform a deck document into its ordered slide records.
#[must_use]
pub fn extract_reveal_slides(document: &DeckDocument) -> Vec<RevealSlide> {
    document
        .pages
        .iter()
        .map(|page| {
            let raw = page.component.to_html();
            let (without_styles, extracted) = html::extract_style_blocks(&raw);
            let (inner, container_style) = container::unwrap_with_style(&without_styles);
            let css = extracted
                .iter()
                .filter_map(|block| filter_global_rules(block))
                .collect();

            RevealSlide { name: page.name.clone(), html: inner, css, container_style }
        })
        .collect()
}

// =============================================================================
// GLOBAL-STYLE FILTERING
// =============================================================================

fn global_selector_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(body|html)\s*[,{]").expect("global selector pattern"))
}

/// Drop rule blocks whose selector targets bare `body`/`html`; returns `None`
/// when nothing survives so empty blocks vanish from the CSS list.
pub(crate) fn filter_global_rules(css: &str) -> Option<String> {
    let mut kept: Vec<String> = Vec::new();

    for rule in css.split('}') {
        if rule.trim().is_empty() {
            continue;
        }
        if global_selector_re().is_match(rule) {
            continue;
        }
        kept.push(format!("{}}}", rule.trim_end()));
    }

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("\n"))
    }
}

#[cfg(test)]
#[path = "reveal_test.rs"]
mod tests;
