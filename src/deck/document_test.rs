use super::*;

// =========================================================================
// JSON round trip
// =========================================================================

#[test]
fn html_page_round_trip() {
    let doc = DeckDocument { pages: vec![Page::new("Intro", "<h1>Hello</h1>")], ..DeckDocument::default() };
    let json = doc.to_json();
    let restored = DeckDocument::from_json(&json).expect("parse");
    assert_eq!(restored.page_count(), 1);
    assert_eq!(restored.pages[0].name, "Intro");
    assert_eq!(restored.pages[0].component.to_html(), "<h1>Hello</h1>");
}

#[test]
fn string_component_parses_as_html_variant() {
    let doc =
        DeckDocument::from_json(r#"{"pages":[{"name":"A","component":"<p>hi</p>"}]}"#).expect("parse");
    assert!(matches!(&doc.pages[0].component, PageContent::Html(h) if h == "<p>hi</p>"));
}

#[test]
fn object_component_parses_as_legacy_variant() {
    let doc = DeckDocument::from_json(
        r#"{"pages":[{"name":"A","component":{"tagName":"section","components":["hi"]}}]}"#,
    )
    .expect("parse");
    assert!(matches!(&doc.pages[0].component, PageContent::Legacy(_)));
    assert_eq!(doc.pages[0].component.to_html(), "<section>hi</section>");
}

#[test]
fn unknown_keys_survive_a_round_trip() {
    // The upstream editor persists more than pages; none of it may be lost.
    let raw = r#"{"pages":[{"name":"A","component":"<p>a</p>","id":"pg-1"}],"assets":[{"src":"logo.png"}]}"#;
    let doc = DeckDocument::from_json(raw).expect("parse");
    let json: serde_json::Value = serde_json::from_str(&doc.to_json()).expect("reparse");
    assert_eq!(json["assets"][0]["src"], "logo.png");
    assert_eq!(json["pages"][0]["id"], "pg-1");
    assert_eq!(json["pages"][0]["component"], "<p>a</p>");
}

#[test]
fn unusable_component_degrades_to_empty_html() {
    let doc = DeckDocument::from_json(
        r#"{"pages":[{"name":"Odd","component":42},{"name":"Fine","component":"<p>ok</p>"}]}"#,
    )
    .expect("parse");
    assert!(matches!(&doc.pages[0].component, PageContent::Opaque(_)));
    assert_eq!(doc.pages[0].component.to_html(), "");
    assert_eq!(doc.pages[1].component.to_html(), "<p>ok</p>");
}

#[test]
fn missing_pages_defaults_to_empty() {
    let doc = DeckDocument::from_json("{}").expect("parse");
    assert_eq!(doc.page_count(), 0);
}

#[test]
fn malformed_json_is_an_error() {
    assert!(DeckDocument::from_json("not json").is_err());
}

// =========================================================================
// Legacy tree flattening
// =========================================================================

fn legacy(json: serde_json::Value) -> LegacyNode {
    serde_json::from_value(json).expect("legacy node")
}

#[test]
fn legacy_renders_tag_classes_attributes() {
    let node = legacy(serde_json::json!({
        "tagName": "p",
        "classes": ["title", {"name": "accent"}],
        "attributes": {"data-role": "headline"},
        "components": ["Quarterly update"]
    }));
    assert_eq!(
        node.to_html(),
        r#"<p class="title accent" data-role="headline">Quarterly update</p>"#
    );
}

#[test]
fn legacy_textnode_renders_escaped_content() {
    let node = legacy(serde_json::json!({
        "tagName": "div",
        "components": [{"type": "textnode", "content": "a < b"}]
    }));
    assert_eq!(node.to_html(), "<div>a &lt; b</div>");
}

#[test]
fn legacy_unknown_tag_defaults_to_div() {
    let node = legacy(serde_json::json!({"components": ["x"]}));
    assert_eq!(node.to_html(), "<div>x</div>");
}

#[test]
fn legacy_rejects_hostile_tag_names() {
    let node = legacy(serde_json::json!({"tagName": "scr ipt>", "components": ["x"]}));
    assert_eq!(node.to_html(), "<div>x</div>");
}

#[test]
fn legacy_nested_components() {
    let node = legacy(serde_json::json!({
        "tagName": "section",
        "components": [
            {"tagName": "h1", "components": ["Title"]},
            {"tagName": "ul", "components": [
                {"tagName": "li", "components": ["one"]},
                {"tagName": "li", "components": ["two"]}
            ]}
        ]
    }));
    assert_eq!(node.to_html(), "<section><h1>Title</h1><ul><li>one</li><li>two</li></ul></section>");
}

#[test]
fn legacy_depth_guard_yields_empty_not_overflow() {
    let mut node = LegacyNode { tag_name: Some("div".into()), ..LegacyNode::default() };
    for _ in 0..200 {
        let mut outer = LegacyNode { tag_name: Some("div".into()), ..LegacyNode::default() };
        outer.components.push(LegacyChild::Node(node));
        node = outer;
    }
    // Must terminate; the innermost levels render as nothing.
    let html = node.to_html();
    assert!(html.starts_with("<div>"));
}
