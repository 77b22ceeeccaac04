//! Speech synthesis — provider client and audio duration probing.
//!
//! DESIGN
//! ======
//! Mirrors the LLM layer: a thin HTTP client behind the [`SpeechSynth`]
//! trait, configured from environment variables, absent (rather than fatal)
//! when unconfigured. Audio is requested as WAV so durations can be computed
//! locally from the container header.

pub mod client;
pub mod wav;

/// Duration assumed for a fragment whose audio cannot be probed. A duration
/// failure must never fail the generation run.
pub const DEFAULT_FRAGMENT_DURATION_MS: u64 = 1000;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by speech synthesis operations.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// The required API key environment variable is not set.
    #[error("missing TTS API key: env var {var} not set")]
    MissingApiKey { var: String },

    /// The HTTP request to the speech provider failed.
    #[error("TTS request failed: {0}")]
    ApiRequest(String),

    /// The speech provider returned a non-success HTTP status.
    #[error("TTS response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The underlying HTTP client could not be constructed.
    #[error("TTS HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl crate::frame::ErrorCode for TtsError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingApiKey { .. } => "E_TTS_MISSING_API_KEY",
            Self::ApiRequest(_) => "E_TTS_REQUEST",
            Self::ApiResponse { .. } => "E_TTS_RESPONSE",
            Self::HttpClientBuild(_) => "E_TTS_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::ApiRequest(_) | Self::ApiResponse { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// One synthesized narration clip.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl SynthesizedAudio {
    /// Clip duration from the audio container, or the fixed fallback when the
    /// header cannot be read.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        wav::duration_ms(&self.bytes).unwrap_or(DEFAULT_FRAGMENT_DURATION_MS)
    }
}

/// Provider-neutral async synthesis seam. Enables mocking in tests.
#[async_trait::async_trait]
pub trait SpeechSynth: Send + Sync {
    /// Synthesize one narration text to audio.
    ///
    /// # Errors
    ///
    /// Returns a [`TtsError`] if the request fails or the provider rejects
    /// the input.
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, TtsError>;
}
