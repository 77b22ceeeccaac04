use super::*;
use crate::frame::ErrorCode;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

// =========================================================================
// Mock synthesis
// =========================================================================

/// Mock provider: fails on configured texts, records peak concurrency.
struct MockSynth {
    fail_on: Vec<String>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockSynth {
    fn new(fail_on: &[&str]) -> Self {
        Self {
            fail_on: fail_on.iter().map(|s| (*s).to_string()).collect(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl SpeechSynth for MockSynth {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, TtsError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.calls.lock().unwrap().push(text.to_string());
        if self.fail_on.iter().any(|f| f == text) {
            return Err(TtsError::ApiResponse { status: 500, body: "boom".into() });
        }
        // Opaque non-WAV bytes: duration probing falls back to the default.
        Ok(SynthesizedAudio { bytes: text.as_bytes().to_vec(), content_type: "audio/wav".into() })
    }
}

fn fragment(slide: usize, index: usize, text: &str) -> Fragment {
    Fragment { slide_index: slide, fragment_index: index, text: text.into() }
}

// =========================================================================
// synthesize_fragments
// =========================================================================

#[tokio::test]
async fn fragments_processed_in_order_with_fallback_duration() {
    let synth: Arc<dyn SpeechSynth> = Arc::new(MockSynth::new(&[]));
    let fragments = vec![fragment(0, 0, "a"), fragment(0, 1, "b"), fragment(1, 0, "c")];

    let processed = synthesize_fragments(&synth, fragments, 2).await.expect("synthesis");

    assert_eq!(processed.len(), 3);
    assert_eq!(
        processed
            .iter()
            .map(|p| (p.slide_index, p.fragment_index))
            .collect::<Vec<_>>(),
        vec![(0, 0), (0, 1), (1, 0)]
    );
    // Non-WAV bytes mean every duration is the fixed fallback.
    assert!(processed
        .iter()
        .all(|p| p.duration_ms == crate::tts::DEFAULT_FRAGMENT_DURATION_MS));
}

#[tokio::test]
async fn batch_size_caps_concurrency() {
    let mock = Arc::new(MockSynth::new(&[]));
    let synth: Arc<dyn SpeechSynth> = mock.clone();
    let fragments: Vec<Fragment> = (0..9).map(|i| fragment(0, i, &format!("t{i}"))).collect();

    synthesize_fragments(&synth, fragments, 3).await.expect("synthesis");

    assert!(mock.peak_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(mock.calls.lock().unwrap().len(), 9);
}

#[tokio::test]
async fn one_failure_fails_the_whole_generation() {
    // 5 fragments, the 3rd fails: the caller gets a generation-level error
    // and no processed output escapes — nothing is ever persisted.
    let synth: Arc<dyn SpeechSynth> = Arc::new(MockSynth::new(&["t2"]));
    let fragments: Vec<Fragment> = (0..5).map(|i| fragment(1, i, &format!("t{i}"))).collect();

    let err = synthesize_fragments(&synth, fragments, 5).await.unwrap_err();
    assert!(matches!(
        err,
        NarrationError::Synthesis { slide_index: 1, fragment_index: 2, .. }
    ));
}

#[tokio::test]
async fn failing_batch_still_completes_before_erroring() {
    // The failure surfaces only after its whole batch has been awaited.
    let mock = Arc::new(MockSynth::new(&["t0"]));
    let synth: Arc<dyn SpeechSynth> = mock.clone();
    let fragments: Vec<Fragment> = (0..3).map(|i| fragment(0, i, &format!("t{i}"))).collect();

    let err = synthesize_fragments(&synth, fragments, 3).await.unwrap_err();
    assert!(matches!(err, NarrationError::Synthesis { fragment_index: 0, .. }));
    // All three requests in the batch were issued despite the failure.
    assert_eq!(mock.calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn empty_fragment_list_is_a_clean_empty_result() {
    let synth: Arc<dyn SpeechSynth> = Arc::new(MockSynth::new(&[]));
    let processed = synthesize_fragments(&synth, vec![], 4).await.expect("empty");
    assert!(processed.is_empty());
}

// =========================================================================
// error surface
// =========================================================================

#[test]
fn error_codes_are_grepable() {
    assert_eq!(NarrationError::TtsNotConfigured.error_code(), "E_TTS_NOT_CONFIGURED");
    let synthesis = NarrationError::Synthesis {
        slide_index: 0,
        fragment_index: 1,
        source: TtsError::ApiResponse { status: 500, body: String::new() },
    };
    assert_eq!(synthesis.error_code(), "E_TTS_SYNTHESIS");
    assert!(synthesis.retryable());
}

#[tokio::test]
async fn generation_without_tts_client_is_not_configured() {
    let state = crate::state::test_helpers::test_app_state();
    let err = generate_narration(&state, "p").await.unwrap_err();
    assert!(matches!(err, NarrationError::TtsNotConfigured));
}

// =========================================================================
// grouping
// =========================================================================

#[test]
fn group_by_slide_preserves_fragment_order() {
    let rows = vec![
        CachedFragmentRow { slide_index: 0, fragment_index: 0, tts_text: "a".into(), audio_id: Uuid::new_v4(), duration_ms: 1 },
        CachedFragmentRow { slide_index: 0, fragment_index: 1, tts_text: "b".into(), audio_id: Uuid::new_v4(), duration_ms: 2 },
        CachedFragmentRow { slide_index: 2, fragment_index: 0, tts_text: "c".into(), audio_id: Uuid::new_v4(), duration_ms: 3 },
    ];
    let grouped = group_by_slide(rows);
    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped[&0].len(), 2);
    assert_eq!(grouped[&0][1].tts_text, "b");
    assert_eq!(grouped[&2][0].tts_text, "c");
}
