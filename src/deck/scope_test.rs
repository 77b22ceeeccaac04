use super::*;

const SCOPE: &str = r#"[data-slide-scope="s1"]"#;

fn rule_count(css: &str) -> usize {
    split_top_level(css)
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .count()
}

// =========================================================================
// basic scoping
// =========================================================================

#[test]
fn plain_selector_gets_scope_prefix() {
    let out = scope_css(".title { color: red; }", SCOPE);
    assert_eq!(out, format!("{SCOPE} .title {{ color: red; }}"));
}

#[test]
fn comma_parts_each_scoped() {
    let out = scope_css(".a, .b { margin: 0; }", SCOPE);
    assert_eq!(out, format!("{SCOPE} .a, {SCOPE} .b {{ margin: 0; }}"));
}

#[test]
fn rule_count_preserved() {
    let css = ".a { x: 1; }\n.b, .c { y: 2; }\nh1 { z: 3; }";
    let out = scope_css(css, SCOPE);
    assert_eq!(rule_count(&out), rule_count(css));
    for segment in split_top_level(&out) {
        if segment.trim().is_empty() {
            continue;
        }
        assert!(segment.contains(SCOPE), "unscoped segment: {segment}");
    }
}

// =========================================================================
// body / html remapping
// =========================================================================

#[test]
fn bare_body_becomes_scope() {
    let out = scope_css("body { background: #fff; }", SCOPE);
    assert_eq!(out, format!("{SCOPE} {{ background: #fff; }}"));
}

#[test]
fn body_descendant_keeps_single_space() {
    let out = scope_css("body .foo { color: blue; }", SCOPE);
    assert_eq!(out, format!("{SCOPE} .foo {{ color: blue; }}"));
    assert!(!out.contains("]  ."), "double space after scope");
}

#[test]
fn body_with_class_stays_attached() {
    let out = scope_css("body.dark { color: #eee; }", SCOPE);
    assert_eq!(out, format!("{SCOPE}.dark {{ color: #eee; }}"));
}

#[test]
fn html_remapped_like_body() {
    let out = scope_css("html { font-size: 24px; }", SCOPE);
    assert_eq!(out, format!("{SCOPE} {{ font-size: 24px; }}"));
}

#[test]
fn selector_merely_starting_with_body_letters_is_not_remapped() {
    let out = scope_css(".bodycopy { color: red; }\nbodyguard { color: red; }", SCOPE);
    assert!(out.contains(&format!("{SCOPE} .bodycopy")));
    assert!(out.contains(&format!("{SCOPE} bodyguard")));
}

// =========================================================================
// at-rules
// =========================================================================

#[test]
fn font_face_passes_through_unscoped() {
    let css = "@font-face { font-family: X; src: url(x.woff); }";
    let out = scope_css(css, SCOPE);
    assert_eq!(out, css);
}

#[test]
fn keyframes_pass_through_whole() {
    let css = "@keyframes spin { from { transform: none; } to { transform: rotate(1turn); } }";
    let out = scope_css(css, SCOPE);
    assert_eq!(out, css);
    assert!(!out.contains(&format!("{SCOPE} from")));
}

#[test]
fn media_inner_rules_are_scoped() {
    let css = "@media (max-width: 600px) { .title { font-size: 12px; } body { margin: 0; } }";
    let out = scope_css(css, SCOPE);
    assert!(out.starts_with("@media (max-width: 600px)"));
    assert!(out.contains(&format!("{SCOPE} .title {{ font-size: 12px; }}")));
    assert!(out.contains(&format!("{SCOPE} {{ margin: 0; }}")));
}

// =========================================================================
// degradation
// =========================================================================

#[test]
fn braceless_garbage_passes_through_with_brace_restored() {
    let out = scope_css("garbage without braces", SCOPE);
    assert_eq!(out, "garbage without braces}");
}

#[test]
fn empty_input_yields_empty_output() {
    assert_eq!(scope_css("", SCOPE), "");
    assert_eq!(scope_css("   \n ", SCOPE), "");
}

#[test]
fn unbalanced_close_brace_does_not_panic() {
    let out = scope_css("} .a { x: 1; }", SCOPE);
    assert!(out.contains(&format!("{SCOPE} .a")));
}
