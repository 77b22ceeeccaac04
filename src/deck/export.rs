//! Static presentation export — a self-contained reveal.js document.
//!
//! DESIGN
//! ======
//! Each slide renders as a `<section data-slide-scope="sN">` holding one
//! `.ct-slide` element with the container style inlined, followed by a
//! `<style>` block of that slide's CSS scoped to the section. The narrated
//! variant additionally aligns narration fragments (lead-in, auto-advance)
//! and embeds `<audio>` references to the cached synthesis output, with a
//! small playback driver keyed to reveal's fragment events.

use std::collections::HashMap;

use super::container::SlideFormat;
use super::html::escape_text;
use super::narration::{self, TimedFragment};
use super::reveal::RevealSlide;
use super::scope::scope_css;

/// One cached narration fragment, ordered by fragment index within its slide.
#[derive(Debug, Clone)]
pub struct NarratedFragment {
    pub duration_ms: u64,
    pub audio_src: String,
}

const REVEAL_CSS_URL: &str = "https://cdn.jsdelivr.net/npm/reveal.js@4/dist/reveal.css";
const REVEAL_THEME_URL: &str = "https://cdn.jsdelivr.net/npm/reveal.js@4/dist/theme/white.css";
const REVEAL_JS_URL: &str = "https://cdn.jsdelivr.net/npm/reveal.js@4/dist/reveal.js";

// =============================================================================
// PLAIN EXPORT
// =============================================================================

/// Render the plain (non-narrated) presentation document.
#[must_use]
pub fn render_presentation(title: &str, slides: &[RevealSlide], format: SlideFormat) -> String {
    let sections: String = slides
        .iter()
        .enumerate()
        .map(|(index, slide)| render_section(index, slide, &slide.html))
        .collect();

    document(title, format, &sections, &reveal_init(format, false))
}

// =============================================================================
// NARRATED EXPORT
// =============================================================================

/// Render the voice-narrated presentation document.
///
/// `narration` maps slide index to that slide's cached fragments in fragment
/// order. Fragment extraction is re-run against the current slide HTML so the
/// embedded ids, indices, and auto-advance durations are reproducible.
#[must_use]
pub fn render_narrated_presentation(
    title: &str,
    slides: &[RevealSlide],
    narration: &HashMap<usize, Vec<NarratedFragment>>,
    format: SlideFormat,
) -> String {
    let sections: String = slides
        .iter()
        .enumerate()
        .map(|(index, slide)| {
            let (annotated, fragments) = narration::extract_fragments(&slide.html, index);
            let cached = narration.get(&index);
            let timed: Vec<TimedFragment> = fragments
                .iter()
                .map(|fragment| {
                    let row = cached.and_then(|rows| rows.get(fragment.fragment_index));
                    TimedFragment {
                        fragment_index: fragment.fragment_index,
                        duration_ms: row.map_or(0, |r| r.duration_ms),
                        audio_src: row.map(|r| r.audio_src.clone()),
                    }
                })
                .collect();
            let aligned = narration::align_slide(&annotated, index, &timed);
            render_section(index, slide, &aligned)
        })
        .collect();

    document(title, format, &sections, &format!("{}\n{PLAYBACK_SCRIPT}", reveal_init(format, true)))
}

// =============================================================================
// ASSEMBLY
// =============================================================================

fn render_section(index: usize, slide: &RevealSlide, inner_html: &str) -> String {
    let scope_token = format!("s{index}");
    let scope_selector = format!("[data-slide-scope=\"{scope_token}\"]");

    let container_style = slide.container_style.as_deref().unwrap_or_default();
    let css = slide.css.join("\n");
    let scoped = if css.trim().is_empty() {
        String::new()
    } else {
        format!("<style>\n{}\n</style>\n", scope_css(&css, &scope_selector))
    };

    format!(
        "<section data-slide-scope=\"{scope_token}\">\n\
         <div class=\"ct-slide\" style=\"{container_style}\">{inner_html}</div>\n\
         {scoped}</section>\n"
    )
}

fn reveal_init(format: SlideFormat, narrated: bool) -> String {
    let autoslide = if narrated { ", autoSlide: 1, autoSlideStoppable: true" } else { "" };
    format!(
        "Reveal.initialize({{ width: {}, height: {}, margin: 0, center: false, hash: true, \
         transition: 'slide', fragments: true{autoslide} }});",
        format.width, format.height
    )
}

/// Fragment-driven audio playback for the narrated export.
const PLAYBACK_SCRIPT: &str = r#"
Reveal.on('fragmentshown', (event) => {
  const index = event.fragment.getAttribute('data-fragment-index');
  const section = event.fragment.closest('section');
  if (!section || index === null) return;
  section.querySelectorAll('audio.tts-audio').forEach((audio) => audio.pause());
  const audio = section.querySelector('audio.tts-audio[data-fragment-index="' + index + '"]');
  if (audio) { audio.currentTime = 0; audio.play().catch(() => {}); }
});
Reveal.on('slidechanged', () => {
  document.querySelectorAll('audio.tts-audio').forEach((audio) => audio.pause());
});
"#;

fn document(title: &str, format: SlideFormat, sections: &str, script: &str) -> String {
    let SlideFormat { width, height } = format;
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="stylesheet" href="{REVEAL_CSS_URL}">
<link rel="stylesheet" href="{REVEAL_THEME_URL}">
<style>
.reveal .ct-slide {{ width: {width}px; height: {height}px; position: relative; text-align: left; }}
.reveal audio.tts-audio {{ display: none; }}
</style>
</head>
<body>
<div class="reveal">
<div class="slides">
{sections}</div>
</div>
<script src="{REVEAL_JS_URL}"></script>
<script>
{script}
</script>
</body>
</html>
"#,
        title = escape_text(title),
    )
}

#[cfg(test)]
#[path = "export_test.rs"]
mod tests;
