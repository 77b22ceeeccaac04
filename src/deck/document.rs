//! Deck document model.
//!
//! DESIGN
//! ======
//! The persisted `project` column is the JSON form of [`DeckDocument`]:
//! ordered pages, each carrying its content as either a raw HTML string
//! (canonical) or a legacy structured component tree kept for decks authored
//! in the old structured-editing mode. Downstream consumers only ever depend
//! on `PageContent::to_html`, never on which variant they received.

use serde::{Deserialize, Serialize};

use super::html::escape_text;

// =============================================================================
// DOCUMENT
// =============================================================================

/// The canonical in-memory form of a deck: ordered pages.
///
/// Page index is the addressing scheme used by every tool operation; it is a
/// position, not a stable id, so reordering invalidates cached indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeckDocument {
    #[serde(default)]
    pub pages: Vec<Page>,
    /// Keys the upstream editor persists alongside `pages`. Carried verbatim
    /// so hydrate → edit → serialize never drops them.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeckDocument {
    /// Parse a persisted `project` JSON string.
    ///
    /// # Errors
    ///
    /// Returns the underlying decode error; callers degrade to the raw record
    /// rather than failing the read.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Serialize back to the persisted `project` JSON string.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"pages\":[]}".to_string())
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }
}

/// One ordered slide of a deck.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub component: PageContent,
    /// Unrecognized per-page keys, preserved across round trips.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Page {
    #[must_use]
    pub fn new(name: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component: PageContent::Html(html.into()),
            extra: serde_json::Map::new(),
        }
    }
}

// =============================================================================
// CONTENT VARIANTS
// =============================================================================

/// Page content: canonical HTML string, or the legacy structured tree.
/// Anything else the store hands back is carried as [`PageContent::Opaque`]
/// and renders as an empty slide — one unusable page must never abort an
/// export of the rest of the deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageContent {
    Html(String),
    Legacy(LegacyNode),
    Opaque(serde_json::Value),
}

impl Default for PageContent {
    fn default() -> Self {
        PageContent::Html(String::new())
    }
}

impl PageContent {
    /// Flatten to HTML. The single contract every consumer depends on.
    #[must_use]
    pub fn to_html(&self) -> String {
        match self {
            PageContent::Html(html) => html.clone(),
            PageContent::Legacy(node) => node.to_html(),
            PageContent::Opaque(_) => String::new(),
        }
    }
}

// =============================================================================
// LEGACY COMPONENT TREE
// =============================================================================

/// Recursion guard for pathological legacy trees.
const MAX_LEGACY_DEPTH: usize = 64;

/// A node of the legacy structured component tree.
///
/// Text nodes appear either as bare strings in `components` or as nodes with
/// `type == "textnode"` and a `content` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyNode {
    #[serde(default, rename = "tagName", skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<LegacyChild>,
}

/// A legacy child: nested node or bare text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyChild {
    Text(String),
    Node(LegacyNode),
}

impl LegacyNode {
    /// Flatten the tree to HTML. Total by construction: unusable nodes render
    /// as empty strings so one malformed subtree never loses the page.
    #[must_use]
    pub fn to_html(&self) -> String {
        self.render(0)
    }

    fn render(&self, depth: usize) -> String {
        if depth > MAX_LEGACY_DEPTH {
            return String::new();
        }

        if self.node_type.as_deref() == Some("textnode") {
            return escape_text(self.content.as_deref().unwrap_or_default());
        }

        // Unknown node kinds default to div.
        let tag = self
            .tag_name
            .as_deref()
            .filter(|t| t.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
            .filter(|t| !t.is_empty())
            .unwrap_or("div");

        let mut open = format!("<{tag}");
        let class_list = self.class_list();
        if !class_list.is_empty() {
            open.push_str(&format!(" class=\"{}\"", escape_text(&class_list)));
        }
        for (name, value) in &self.attributes {
            if name == "class" || !is_valid_attr_name(name) {
                continue;
            }
            match value {
                serde_json::Value::String(s) => {
                    open.push_str(&format!(" {name}=\"{}\"", escape_text(s)));
                }
                serde_json::Value::Bool(true) => open.push_str(&format!(" {name}")),
                serde_json::Value::Bool(false) | serde_json::Value::Null => {}
                other => open.push_str(&format!(" {name}=\"{}\"", escape_text(&other.to_string()))),
            }
        }
        open.push('>');

        let children: String = self
            .components
            .iter()
            .map(|child| match child {
                LegacyChild::Text(text) => escape_text(text),
                LegacyChild::Node(node) => node.render(depth + 1),
            })
            .collect();

        format!("{open}{children}</{tag}>")
    }

    /// Classes arrive as bare strings or `{name}` objects.
    fn class_list(&self) -> String {
        self.classes
            .iter()
            .filter_map(|c| match c {
                serde_json::Value::String(s) => Some(s.as_str()),
                serde_json::Value::Object(map) => map.get("name").and_then(|n| n.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn is_valid_attr_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
}

#[cfg(test)]
#[path = "document_test.rs"]
mod tests;
