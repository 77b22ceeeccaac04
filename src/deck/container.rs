//! Slide container codec — the dimensioned envelope around authored HTML.
//!
//! DESIGN
//! ======
//! Freshly authored slide HTML is wrapped exactly once in a marker element
//! (`data-slide-container`) carrying the deck's pixel format, followed by a
//! `<style>` block sizing the editor's slide root (the body of the canvas
//! iframe). Unwrapping strips exactly one layer and treats unmarked content
//! as already unwrapped, so legacy or partial pages pass through instead of
//! being rejected.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::html;

/// Marker attribute identifying the container element.
pub const CONTAINER_ATTR: &str = "data-slide-container";

// =============================================================================
// FORMAT
// =============================================================================

/// Deck slide format in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideFormat {
    pub width: u32,
    pub height: u32,
}

impl SlideFormat {
    pub const WIDESCREEN: SlideFormat = SlideFormat { width: 1920, height: 1080 };
}

impl Default for SlideFormat {
    fn default() -> Self {
        Self::WIDESCREEN
    }
}

// =============================================================================
// WRAP / UNWRAP
// =============================================================================

/// Wrap authored content in the slide container envelope.
///
/// The content itself is treated as opaque text; no validation is attempted.
/// `style_overrides` are extra declarations appended to the container style.
#[must_use]
pub fn wrap(content: &str, format: SlideFormat, style_overrides: Option<&str>) -> String {
    let SlideFormat { width, height } = format;
    let overrides = style_overrides.unwrap_or_default();
    format!(
        "<div {CONTAINER_ATTR}=\"true\" style=\"width: {width}px; height: {height}px; \
         margin: 0 auto; background-color: #ffffff; overflow: hidden;{overrides}\">{content}</div>\
         <style>\nbody {{ width: {width}px; height: {height}px; margin: 0; background-color: #ffffff; }}\n</style>"
    )
}

/// Strip exactly one container layer, returning the inner HTML.
///
/// Content without the marker is returned unchanged: legacy and partial pages
/// must pass through, not fail.
#[must_use]
pub fn unwrap(content: &str) -> String {
    unwrap_with_style(content).0
}

/// Like [`unwrap`], additionally returning the container element's inline
/// style when a marker was found.
#[must_use]
pub fn unwrap_with_style(content: &str) -> (String, Option<String>) {
    let Some(element) = html::find_element_with_attr(content, CONTAINER_ATTR) else {
        return (content.to_string(), None);
    };
    let style = html::attr_value(element.open_tag(content), "style").flatten();
    (element.inner(content).to_string(), style)
}

/// Whether `content` already carries a container envelope (marker attribute
/// or an embedded `<style>` block). Write paths use this to decide between
/// wrapping new content and merely normalizing existing dimensions.
#[must_use]
pub fn is_complete_container(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    lower.contains(CONTAINER_ATTR) || lower.contains("<style")
}

// =============================================================================
// DIMENSION ENFORCEMENT
// =============================================================================

fn width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)width\s*:\s*\d+(?:\.\d+)?\s*px").expect("width pattern"))
}

fn height_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)height\s*:\s*\d+(?:\.\d+)?\s*px").expect("height pattern"))
}

/// Rewrite the container's own width/height pixel declarations to match the
/// deck format, leaving nested element dimensions alone.
///
/// Best-effort: the input CSS is editor-generated and simple. On anything
/// unexpected the input is returned unchanged.
#[must_use]
pub fn enforce_dimensions(content: &str, format: SlideFormat) -> String {
    match try_enforce(content, format) {
        Some(out) => out,
        None => {
            debug!("dimension enforcement skipped: no container style found");
            content.to_string()
        }
    }
}

fn try_enforce(content: &str, format: SlideFormat) -> Option<String> {
    let mut out = content.to_string();
    let mut touched = false;

    // The marker element's inline style.
    if let Some(element) = html::find_element_with_attr(&out, CONTAINER_ATTR) {
        let open_tag = element.open_tag(&out).to_string();
        if let Some(Some(style)) = html::attr_value(&open_tag, "style") {
            let rewritten = rewrite_dimensions(&style, format);
            if rewritten != style {
                let new_tag = open_tag.replacen(&style, &rewritten, 1);
                out.replace_range(element.open_start..element.open_end, &new_tag);
                touched = true;
            } else {
                touched = true;
            }
        }
    }

    // Slide-root rules inside style blocks.
    let rewritten = rewrite_style_blocks(&out, format);
    if rewritten != out {
        out = rewritten;
        touched = true;
    } else if out.to_ascii_lowercase().contains("<style") {
        touched = true;
    }

    touched.then_some(out)
}

fn rewrite_dimensions(css: &str, format: SlideFormat) -> String {
    let with_width = width_re().replace_all(css, format!("width: {}px", format.width));
    height_re()
        .replace_all(&with_width, format!("height: {}px", format.height))
        .into_owned()
}

/// Rewrite width/height only inside rules that size the slide root
/// (`body`, `html`, or the container marker itself).
fn rewrite_style_blocks(content: &str, format: SlideFormat) -> String {
    let lower = content.to_ascii_lowercase();
    let mut out = String::with_capacity(content.len());
    let mut i = 0;

    while let Some(offset) = lower[i..].find("<style") {
        let start = i + offset;
        let Some(open_close) = lower[start..].find('>') else {
            break;
        };
        let body_start = start + open_close + 1;
        let Some(close_offset) = lower[body_start..].find("</style") else {
            break;
        };
        let body_end = body_start + close_offset;

        out.push_str(&content[i..body_start]);
        out.push_str(&rewrite_root_rules(&content[body_start..body_end], format));
        i = body_end;
    }

    out.push_str(&content[i..]);
    out
}

fn rewrite_root_rules(css: &str, format: SlideFormat) -> String {
    let mut out = String::with_capacity(css.len());
    for (idx, rule) in css.split('}').enumerate() {
        if idx > 0 {
            out.push('}');
        }
        let Some((selector, body)) = rule.split_once('{') else {
            out.push_str(rule);
            continue;
        };
        let is_root = {
            let s = selector.trim().to_ascii_lowercase();
            s.starts_with("body") || s.starts_with("html") || s.contains(CONTAINER_ATTR)
        };
        out.push_str(selector);
        out.push('{');
        if is_root {
            out.push_str(&rewrite_dimensions(body, format));
        } else {
            out.push_str(body);
        }
    }
    out
}

#[cfg(test)]
#[path = "container_test.rs"]
mod tests;
