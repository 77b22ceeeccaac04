//! Narration fragments — extraction from slide HTML and playback alignment.
//!
//! DESIGN
//! ======
//! Narration-bearing elements carry `data-tts`; the narration text is the
//! attribute value, falling back to the element's own text content. Fragment
//! indices are zero-based per slide and follow document order — that order is
//! load-bearing all the way through synthesis, caching, and playback.
//!
//! Alignment inserts a zero-duration lead-in fragment at index 0 for every
//! slide after the first, so advancing into a new slide always takes one
//! explicit step before narration starts. Real fragments then shift by +1 and
//! auto-advance after their audio duration plus a fixed buffer.

use super::html;

/// Attribute marking a narration-bearing element.
pub const NARRATION_ATTR: &str = "data-tts";

/// Attribute carrying the deterministic per-fragment id assigned at
/// extraction so alignment can relocate the element.
pub const FRAGMENT_ID_ATTR: &str = "data-tts-id";

/// Auto-advance value of the lead-in fragment. Value preserved from the
/// original playback tuning; treat as a knob, not a derived quantity.
pub const LEAD_IN_AUTOSLIDE_MS: u64 = 10;

/// Padding added to each fragment's audio duration before auto-advancing,
/// so playback is not clipped mid-word.
pub const AUDIO_BUFFER_MS: u64 = 250;

// =============================================================================
// TYPES
// =============================================================================

/// One narration unit within a slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub slide_index: usize,
    /// Zero-based position within the slide, in document order.
    pub fragment_index: usize,
    pub text: String,
}

/// A fragment with synthesized timing, ready for alignment.
#[derive(Debug, Clone)]
pub struct TimedFragment {
    pub fragment_index: usize,
    pub duration_ms: u64,
    /// Reference to the cached audio, when available.
    pub audio_src: Option<String>,
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Deterministic element id for one fragment.
#[must_use]
pub fn fragment_id(slide_index: usize, fragment_index: usize) -> String {
    format!("tts-{slide_index}-{fragment_index}")
}

/// Scan a slide's HTML for narration fragments.
///
/// Returns the HTML with each narration element tagged by a deterministic
/// [`FRAGMENT_ID_ATTR`], plus the fragments in document order. Slides with no
/// tagged elements but non-empty text synthesize exactly one whole-slide
/// fragment: every non-empty slide narrates.
#[must_use]
pub fn extract_fragments(slide_html: &str, slide_index: usize) -> (String, Vec<Fragment>) {
    let elements = html::find_elements_with_attr(slide_html, NARRATION_ATTR);

    if elements.is_empty() {
        let text = html::strip_tags(slide_html);
        if text.is_empty() {
            return (slide_html.to_string(), Vec::new());
        }
        return (
            slide_html.to_string(),
            vec![Fragment { slide_index, fragment_index: 0, text }],
        );
    }

    let mut fragments = Vec::new();
    let mut annotated = String::with_capacity(slide_html.len());
    let mut cursor = 0;

    for element in &elements {
        let open_tag = element.open_tag(slide_html);
        let text = html::attr_value(open_tag, NARRATION_ATTR)
            .flatten()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| html::strip_tags(element.inner(slide_html)));
        let text = text.trim().to_string();
        if text.is_empty() {
            continue;
        }

        let fragment_index = fragments.len();
        let id = fragment_id(slide_index, fragment_index);
        let tagged = html::inject_attributes(open_tag, None, &[(FRAGMENT_ID_ATTR, id)]);

        annotated.push_str(&slide_html[cursor..element.open_start]);
        annotated.push_str(&tagged);
        cursor = element.open_end;

        fragments.push(Fragment { slide_index, fragment_index, text });
    }
    annotated.push_str(&slide_html[cursor..]);

    (annotated, fragments)
}

// =============================================================================
// ALIGNMENT
// =============================================================================

/// Index a fragment is exposed at during playback: slides after the first
/// reserve index 0 for the lead-in.
#[must_use]
pub fn exposed_index(slide_index: usize, fragment_index: usize) -> usize {
    fragment_index + usize::from(slide_index > 0)
}

/// Attach playback behavior to an annotated slide.
///
/// Each timed fragment's element becomes a `fragment` with its exposed index
/// and an auto-advance of `duration + AUDIO_BUFFER_MS`; an `<audio>` element
/// per fragment is appended when a source is known. Slides after the first
/// get the zero-narration lead-in at exposed index 0. Output is a pure
/// function of its inputs.
#[must_use]
pub fn align_slide(annotated_html: &str, slide_index: usize, timed: &[TimedFragment]) -> String {
    let mut out = annotated_html.to_string();

    for fragment in timed {
        let id = fragment_id(slide_index, fragment.fragment_index);
        let exposed = exposed_index(slide_index, fragment.fragment_index);
        let autoslide = fragment.duration_ms + AUDIO_BUFFER_MS;

        let target = html::find_elements_with_attr(&out, FRAGMENT_ID_ATTR)
            .into_iter()
            .find(|el| html::attr_value(el.open_tag(&out), FRAGMENT_ID_ATTR).flatten().as_deref() == Some(&id));

        if let Some(element) = target {
            let tagged = html::inject_attributes(
                element.open_tag(&out),
                Some("fragment"),
                &[
                    ("data-fragment-index", exposed.to_string()),
                    ("data-autoslide", autoslide.to_string()),
                ],
            );
            out.replace_range(element.open_start..element.open_end, &tagged);
        } else {
            // Whole-slide fallback fragment: group the entire slide content.
            out = format!(
                "<div class=\"fragment\" data-fragment-index=\"{exposed}\" data-autoslide=\"{autoslide}\">{out}</div>"
            );
        }
    }

    if slide_index > 0 {
        out = format!(
            "<span class=\"fragment\" data-fragment-index=\"0\" data-autoslide=\"{LEAD_IN_AUTOSLIDE_MS}\"></span>{out}"
        );
    }

    for fragment in timed {
        if let Some(src) = &fragment.audio_src {
            let exposed = exposed_index(slide_index, fragment.fragment_index);
            out.push_str(&format!(
                "<audio class=\"tts-audio\" data-fragment-index=\"{exposed}\" preload=\"auto\" src=\"{src}\"></audio>"
            ));
        }
    }

    out
}

#[cfg(test)]
#[path = "narration_test.rs"]
mod tests;
