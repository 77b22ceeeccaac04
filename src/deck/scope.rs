//! CSS scoping — rewrite selectors so a slide's CSS applies only inside that
//! slide's rendered subtree.
//!
//! DESIGN
//! ======
//! Input CSS is editor-generated and simple; rules are split at top-level
//! closing braces (a depth counter keeps `@media`/`@keyframes` bodies whole).
//! At-rules pass through unscoped except `@media`, whose inner block is
//! scoped recursively. Bare `html`/`body` selectors are remapped onto the
//! slide root by replacing the keyword with the scope selector; every other
//! selector part gets the scope selector prefixed. This function must never
//! fail: malformed input degrades to passthrough.

/// Deepest `@media` nesting that will still be scoped; beyond this the block
/// passes through untouched.
const MAX_AT_RULE_DEPTH: usize = 8;

/// Scope every rule in `css` under `scope` (e.g. `[data-slide-scope="s3"]`).
#[must_use]
pub fn scope_css(css: &str, scope: &str) -> String {
    scope_rules(css, scope, 0)
}

fn scope_rules(css: &str, scope: &str, depth: usize) -> String {
    let mut out: Vec<String> = Vec::new();

    for segment in split_top_level(css) {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('@') {
            out.push(scope_at_rule(trimmed, scope, depth));
            continue;
        }

        let Some(brace) = trimmed.find('{') else {
            // No declaration block: pass through, restoring the brace the
            // split consumed.
            let mut passthrough = trimmed.to_string();
            if !passthrough.ends_with('}') {
                passthrough.push('}');
            }
            out.push(passthrough);
            continue;
        };

        let selector = &trimmed[..brace];
        let body = trimmed[brace + 1..].strip_suffix('}').unwrap_or(&trimmed[brace + 1..]);

        let scoped = selector
            .split(',')
            .map(|part| scope_selector_part(part, scope))
            .collect::<Vec<_>>()
            .join(", ");

        out.push(format!("{scoped} {{{body}}}"));
    }

    out.join("\n")
}

/// At-rules are opaque except `@media`, whose body contains ordinary rules
/// that still need scoping. `@font-face`, `@keyframes` and friends contain
/// no element selectors and must not be touched.
fn scope_at_rule(segment: &str, scope: &str, depth: usize) -> String {
    let is_media = segment.to_ascii_lowercase().starts_with("@media");
    if !is_media || depth >= MAX_AT_RULE_DEPTH {
        return segment.to_string();
    }

    let Some(open) = segment.find('{') else {
        return segment.to_string();
    };
    let Some(close) = segment.rfind('}') else {
        return segment.to_string();
    };
    if close <= open {
        return segment.to_string();
    }

    let prelude = &segment[..open];
    let inner = &segment[open + 1..close];
    let scoped_inner = scope_rules(inner, scope, depth + 1);
    format!("{prelude}{{\n{scoped_inner}\n}}")
}

/// Scope one comma-separated selector part.
///
/// `body`/`html` are slide-root aliases: the keyword is replaced by the scope
/// selector directly, so `body .foo` becomes `{scope} .foo` (single space)
/// and `body.foo` becomes `{scope}.foo`. Anything else is prefixed with
/// `{scope} `.
fn scope_selector_part(part: &str, scope: &str) -> String {
    let part = part.trim();
    if part.is_empty() {
        return scope.to_string();
    }

    for root in ["body", "html"] {
        if let Some(rest) = part.strip_prefix(root) {
            // Only treat it as the root keyword at a selector boundary
            // (`body`, `body .x`, `body.x`, `body>.x`), not `bodyguard`.
            let boundary = rest
                .chars()
                .next()
                .is_none_or(|c| c.is_whitespace() || matches!(c, '.' | '#' | '[' | ':' | '>' | '+' | '~'));
            if boundary {
                return format!("{scope}{rest}");
            }
        }
    }

    format!("{scope} {part}")
}

/// Split CSS into rule segments at top-level closing braces. Each segment
/// retains its trailing `}`; a braceless tail becomes the final segment.
fn split_top_level(css: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in css.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    segments.push(&css[start..=i]);
                    start = i + 1;
                }
            }
            _ => {}
        }
    }

    if start < css.len() {
        segments.push(&css[start..]);
    }
    segments
}

#[cfg(test)]
#[path = "scope_test.rs"]
mod tests;
