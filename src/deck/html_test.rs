use super::*;

// =========================================================================
// tokenize
// =========================================================================

#[test]
fn tokenize_open_close_pairs() {
    let tokens = tokenize("<div><p>hi</p></div>");
    assert_eq!(tokens.len(), 4);
    assert!(matches!(&tokens[0], Token::Open { tag, .. } if tag == "div"));
    assert!(matches!(&tokens[1], Token::Open { tag, .. } if tag == "p"));
    assert!(matches!(&tokens[2], Token::Close { tag, .. } if tag == "p"));
    assert!(matches!(&tokens[3], Token::Close { tag, .. } if tag == "div"));
}

#[test]
fn tokenize_marks_void_elements_self_closing() {
    let tokens = tokenize("<p>a<br>b</p>");
    assert!(matches!(&tokens[1], Token::Open { tag, self_closing, .. } if tag == "br" && *self_closing));
}

#[test]
fn tokenize_honors_quoted_angle_brackets() {
    let tokens = tokenize(r#"<div data-x="a > b">text</div>"#);
    assert_eq!(tokens.len(), 2);
    assert!(matches!(&tokens[0], Token::Open { tag, .. } if tag == "div"));
}

#[test]
fn tokenize_skips_comments_and_raw_text() {
    let tokens = tokenize("<!-- <p>not a tag</p> --><style>p { color: red; }</style><em>x</em>");
    let names: Vec<&str> = tokens
        .iter()
        .map(|t| match t {
            Token::Open { tag, .. } | Token::Close { tag, .. } => tag.as_str(),
        })
        .collect();
    assert_eq!(names, vec!["style", "style", "em", "em"]);
}

// =========================================================================
// find_elements_with_attr
// =========================================================================

#[test]
fn find_elements_in_document_order() {
    let html = r#"<div><p data-tts="one">A</p><span>skip</span><p data-tts="two">B</p></div>"#;
    let found = find_elements_with_attr(html, "data-tts");
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].inner(html), "A");
    assert_eq!(found[1].inner(html), "B");
}

#[test]
fn find_element_handles_nested_same_tag() {
    let html = r#"<div data-mark><div>inner</div></div><div>after</div>"#;
    let found = find_element_with_attr(html, "data-mark").expect("element");
    assert_eq!(found.inner(html), "<div>inner</div>");
    assert_eq!(&html[found.end..], "<div>after</div>");
}

#[test]
fn find_element_missing_attr_returns_none() {
    assert!(find_element_with_attr("<div>plain</div>", "data-mark").is_none());
}

#[test]
fn unclosed_element_extends_to_end() {
    let html = "<div data-mark><p>dangling";
    let found = find_element_with_attr(html, "data-mark").expect("element");
    assert_eq!(found.inner(html), "<p>dangling");
}

// =========================================================================
// attributes
// =========================================================================

#[test]
fn attr_value_variants() {
    let tag = r#"<p data-tts="hello" hidden data-n='7'>"#;
    assert_eq!(attr_value(tag, "data-tts"), Some(Some("hello".into())));
    assert_eq!(attr_value(tag, "hidden"), Some(None));
    assert_eq!(attr_value(tag, "data-n"), Some(Some("7".into())));
    assert_eq!(attr_value(tag, "missing"), None);
}

#[test]
fn inject_attributes_adds_class_and_attrs() {
    let out = inject_attributes("<p>", Some("fragment"), &[("data-autoslide", "1250".into())]);
    assert_eq!(out, r#"<p class="fragment" data-autoslide="1250">"#);
}

#[test]
fn inject_attributes_merges_existing_class() {
    let out = inject_attributes(r#"<p class="title">"#, Some("fragment"), &[]);
    assert_eq!(out, r#"<p class="title fragment">"#);
}

#[test]
fn inject_attributes_is_idempotent_for_class() {
    let out = inject_attributes(r#"<p class="fragment">"#, Some("fragment"), &[]);
    assert_eq!(out, r#"<p class="fragment">"#);
}

// =========================================================================
// style blocks
// =========================================================================

#[test]
fn extract_style_blocks_removes_and_collects() {
    let html = "<h1>A</h1><style>h1 { color: red; }</style><p>B</p><style>p { margin: 0; }</style>";
    let (out, css) = extract_style_blocks(html);
    assert_eq!(out, "<h1>A</h1><p>B</p>");
    assert_eq!(css, vec!["h1 { color: red; }", "p { margin: 0; }"]);
}

#[test]
fn extract_style_blocks_without_styles_is_identity() {
    let html = "<h1>A</h1>";
    let (out, css) = extract_style_blocks(html);
    assert_eq!(out, html);
    assert!(css.is_empty());
}

// =========================================================================
// text
// =========================================================================

#[test]
fn strip_tags_flattens_and_collapses() {
    let text = strip_tags("<h1>Hello</h1>\n  <p>big <em>world</em></p>");
    assert_eq!(text, "Hello big world");
}

#[test]
fn strip_tags_decodes_entities() {
    assert_eq!(strip_tags("<p>a &amp; b &lt;c&gt;</p>"), "a & b <c>");
}

#[test]
fn strip_tags_excludes_style_content() {
    assert_eq!(strip_tags("<style>p { color: red; }</style><p>visible</p>"), "visible");
}

#[test]
fn escape_text_round() {
    assert_eq!(escape_text(r#"a < b & "c""#), "a &lt; b &amp; &quot;c&quot;");
}
