//! Minimal HTML scanning helpers for slide markup.
//!
//! DESIGN
//! ======
//! Slide HTML is machine-generated by the upstream visual editor, so a full
//! HTML5 parser is deliberately not used: the transforms below must preserve
//! the author's markup byte-for-byte outside the spans they edit, which a
//! parse/serialize round trip does not guarantee. Instead this module scans
//! tags with a small tokenizer (quote-aware, comment-aware, raw-text-aware)
//! and exposes span-based element lookup, attribute parsing, and in-place
//! attribute injection.

/// Elements that never have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is raw text (no nested tags).
const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script"];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

fn is_raw_text(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.contains(&tag)
}

// =============================================================================
// TOKENIZER
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) enum Token {
    /// `<tag ...>` — `end` is one past the closing `>`.
    Open { tag: String, start: usize, end: usize, self_closing: bool },
    /// `</tag>` — `end` is one past the closing `>`.
    Close { tag: String, start: usize, end: usize },
}

/// Tokenize all tags in `html`. Text runs are skipped; comments, doctypes,
/// and raw-text element bodies are never tokenized.
pub(crate) fn tokenize(html: &str) -> Vec<Token> {
    let bytes = html.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let Some(offset) = html[i..].find('<') else {
            break;
        };
        let start = i + offset;
        let after = start + 1;
        if after >= bytes.len() {
            break;
        }

        match bytes[after] {
            b'!' => {
                // Comment or doctype.
                i = if html[after..].starts_with("!--") {
                    html[after..]
                        .find("-->")
                        .map_or(bytes.len(), |p| after + p + 3)
                } else {
                    html[after..].find('>').map_or(bytes.len(), |p| after + p + 1)
                };
            }
            b'/' => {
                let name_start = after + 1;
                let name = read_tag_name(html, name_start);
                let end = html[name_start..]
                    .find('>')
                    .map_or(bytes.len(), |p| name_start + p + 1);
                if !name.is_empty() {
                    tokens.push(Token::Close { tag: name, start, end });
                }
                i = end;
            }
            c if c.is_ascii_alphabetic() => {
                let name = read_tag_name(html, after);
                let Some((end, self_closing)) = find_tag_end(html, after) else {
                    break;
                };
                let lower = name.to_ascii_lowercase();
                tokens.push(Token::Open {
                    tag: lower.clone(),
                    start,
                    end,
                    self_closing: self_closing || is_void(&lower),
                });
                i = end;
                // Raw text content: jump straight to the closing tag.
                if is_raw_text(&lower) && !self_closing {
                    let close_pat = format!("</{lower}");
                    if let Some(p) = html[end..].to_ascii_lowercase().find(&close_pat) {
                        i = end + p;
                    } else {
                        i = bytes.len();
                    }
                }
            }
            _ => {
                // Stray '<' in text.
                i = after;
            }
        }
    }

    tokens
}

fn read_tag_name(html: &str, from: usize) -> String {
    html[from..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Find the end of an open tag starting just after its '<', honoring quoted
/// attribute values. Returns (one past '>', `self_closing`).
fn find_tag_end(html: &str, from: usize) -> Option<(usize, bool)> {
    let bytes = html.as_bytes();
    let mut quote: Option<u8> = None;
    let mut prev_significant = 0u8;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return Some((i + 1, prev_significant == b'/')),
                _ => {
                    if !b.is_ascii_whitespace() {
                        prev_significant = b;
                    }
                }
            },
        }
        i += 1;
    }
    None
}

// =============================================================================
// ELEMENT LOOKUP
// =============================================================================

/// Byte spans of one element located in a scan.
#[derive(Debug, Clone)]
pub(crate) struct ScannedElement {
    /// Index of the element's '<'.
    pub open_start: usize,
    /// One past the open tag's '>'. Equals `inner_start`.
    pub open_end: usize,
    /// Index of the matching close tag's '<' (or end of input when unclosed).
    pub inner_end: usize,
    /// One past the close tag's '>' (or end of input).
    pub end: usize,
    pub self_closing: bool,
}

impl ScannedElement {
    /// The full open tag text, `<` through `>`.
    pub fn open_tag<'a>(&self, html: &'a str) -> &'a str {
        &html[self.open_start..self.open_end]
    }

    /// The element's inner HTML.
    pub fn inner<'a>(&self, html: &'a str) -> &'a str {
        if self.self_closing {
            ""
        } else {
            &html[self.open_end..self.inner_end]
        }
    }
}

/// Find every element whose open tag carries `attr`, in document order.
pub(crate) fn find_elements_with_attr(html: &str, attr: &str) -> Vec<ScannedElement> {
    let tokens = tokenize(html);
    let mut found = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        let Token::Open { tag, start, end, self_closing } = token else {
            continue;
        };
        if attr_value(&html[*start..*end], attr).is_none() {
            continue;
        }

        let (inner_end, elem_end) = if *self_closing {
            (*end, *end)
        } else {
            match_close(&tokens, idx, tag).unwrap_or((html.len(), html.len()))
        };

        found.push(ScannedElement {
            open_start: *start,
            open_end: *end,
            inner_end,
            end: elem_end,
            self_closing: *self_closing,
        });
    }

    found
}

/// Find the first element whose open tag carries `attr`.
pub(crate) fn find_element_with_attr(html: &str, attr: &str) -> Option<ScannedElement> {
    find_elements_with_attr(html, attr).into_iter().next()
}

/// Locate the close tag matching the open token at `open_idx`.
/// Returns (index of close '<', one past close '>').
fn match_close(tokens: &[Token], open_idx: usize, open_tag: &str) -> Option<(usize, usize)> {
    let mut depth = 1usize;
    for token in &tokens[open_idx + 1..] {
        match token {
            Token::Open { tag, self_closing, .. } => {
                if tag == open_tag && !self_closing {
                    depth += 1;
                }
            }
            Token::Close { tag, start, end } => {
                if tag == open_tag {
                    depth -= 1;
                    if depth == 0 {
                        return Some((*start, *end));
                    }
                }
            }
        }
    }
    None
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

/// Parse the attributes of an open tag (the full `<tag ...>` text).
pub(crate) fn parse_attrs(open_tag: &str) -> Vec<(String, Option<String>)> {
    let inner = open_tag
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_end_matches('/');
    let mut chars = inner.chars();

    // Skip the tag name.
    for c in chars.by_ref() {
        if c.is_whitespace() {
            break;
        }
    }

    let mut attrs = Vec::new();
    let rest: String = chars.collect();
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let name_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' {
            i += 1;
        }
        let name = rest[name_start..i].to_ascii_lowercase();
        if name.is_empty() {
            i += 1;
            continue;
        }
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                let value_start = i;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                attrs.push((name, Some(rest[value_start..i].to_string())));
                i += 1;
            } else {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                attrs.push((name, Some(rest[value_start..i].to_string())));
            }
        } else {
            attrs.push((name, None));
        }
    }
    attrs
}

/// Look up one attribute on an open tag. `Some(None)` means the attribute is
/// present with no value.
pub(crate) fn attr_value(open_tag: &str, name: &str) -> Option<Option<String>> {
    parse_attrs(open_tag)
        .into_iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Rewrite an open tag, merging `extra_class` into any existing class list and
/// appending `attrs` before the closing '>'.
pub(crate) fn inject_attributes(
    open_tag: &str,
    extra_class: Option<&str>,
    attrs: &[(&str, String)],
) -> String {
    let mut out = open_tag.to_string();

    if let Some(class) = extra_class {
        let existing = attr_value(&out, "class").flatten();
        match existing {
            Some(list) if list.split_whitespace().any(|c| c == class) => {}
            Some(list) => {
                let needle = format!("\"{list}\"");
                let replacement = format!("\"{list} {class}\"");
                if out.contains(&needle) {
                    out = out.replacen(&needle, &replacement, 1);
                } else {
                    let needle = format!("'{list}'");
                    let replacement = format!("'{list} {class}'");
                    out = out.replacen(&needle, &replacement, 1);
                }
            }
            None => {
                out = append_before_close(&out, &format!(" class=\"{class}\""));
            }
        }
    }

    for (name, value) in attrs {
        if attr_value(&out, name).is_none() {
            out = append_before_close(&out, &format!(" {name}=\"{value}\""));
        }
    }

    out
}

fn append_before_close(open_tag: &str, insertion: &str) -> String {
    let trimmed = open_tag.trim_end();
    if let Some(stripped) = trimmed.strip_suffix("/>") {
        format!("{}{insertion}/>", stripped.trim_end())
    } else if let Some(stripped) = trimmed.strip_suffix('>') {
        format!("{stripped}{insertion}>")
    } else {
        format!("{open_tag}{insertion}")
    }
}

// =============================================================================
// STYLE BLOCKS
// =============================================================================

/// Remove every `<style>...</style>` block, returning the remaining HTML and
/// the extracted CSS bodies in document order.
pub(crate) fn extract_style_blocks(html: &str) -> (String, Vec<String>) {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut css = Vec::new();
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
        let Some(tag_close) = lower[body_end..].find('>') else {
            break;
        };
        let block_end = body_end + tag_close + 1;

        out.push_str(&html[i..start]);
        let body = html[body_start..body_end].trim();
        if !body.is_empty() {
            css.push(body.to_string());
        }
        i = block_end;
    }

    out.push_str(&html[i..]);
    (out, css)
}

// =============================================================================
// TEXT
// =============================================================================

/// Flatten markup into its visible text content: tags removed, basic entities
/// decoded, whitespace collapsed.
pub(crate) fn strip_tags(html: &str) -> String {
    let (without_styles, _) = extract_style_blocks(html);
    let mut text = String::with_capacity(without_styles.len());
    let mut cursor = 0;

    let tokens = tokenize(&without_styles);
    for token in &tokens {
        let (start, end) = match token {
            Token::Open { start, end, .. } | Token::Close { start, end, .. } => (*start, *end),
        };
        if start > cursor {
            text.push_str(&without_styles[cursor..start]);
            // Block boundaries become whitespace so adjacent words don't fuse.
            text.push(' ');
        } else if start == cursor {
            text.push(' ');
        }
        cursor = end;
    }
    if cursor < without_styles.len() {
        text.push_str(&without_styles[cursor..]);
    }

    let decoded = decode_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the small entity set the upstream editor emits.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// HTML-escape a text node.
pub(crate) fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "html_test.rs"]
mod tests;
