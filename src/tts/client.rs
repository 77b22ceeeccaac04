//! Speech synthesis HTTP client (OpenAI-compatible `/audio/speech`).

use std::time::Duration;

use super::{SpeechSynth, SynthesizedAudio, TtsError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini-tts";
const DEFAULT_VOICE: &str = "alloy";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// CLIENT
// =============================================================================

pub struct TtsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
}

impl TtsClient {
    /// Build a TTS client from environment variables.
    ///
    /// - `TTS_API_KEY_ENV`: name of the env var holding the API key
    /// - `TTS_BASE_URL`: OpenAI-compatible API base (default `api.openai.com/v1`)
    /// - `TTS_MODEL` / `TTS_VOICE`
    /// - `TTS_REQUEST_TIMEOUT_SECS` / `TTS_CONNECT_TIMEOUT_SECS`
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails
    /// to build.
    pub fn from_env() -> Result<Self, TtsError> {
        let key_var =
            std::env::var("TTS_API_KEY_ENV").map_err(|_| TtsError::MissingApiKey { var: "TTS_API_KEY_ENV".into() })?;
        let api_key = std::env::var(&key_var).map_err(|_| TtsError::MissingApiKey { var: key_var.clone() })?;

        let base_url = std::env::var("TTS_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| DEFAULT_VOICE.to_string());

        let request_timeout = env_parse("TTS_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS);
        let connect_timeout = env_parse("TTS_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .connect_timeout(Duration::from_secs(connect_timeout))
            .build()
            .map_err(|e| TtsError::HttpClientBuild(e.to_string()))?;

        Ok(Self { http, api_key, base_url, model, voice })
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

#[async_trait::async_trait]
impl SpeechSynth for TtsClient {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, TtsError> {
        let body = SpeechRequest { model: &self.model, voice: &self.voice, input: text, response_format: "wav" };

        let response = self
            .http
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::ApiResponse { status, body });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/wav")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::ApiRequest(e.to_string()))?;

        Ok(SynthesizedAudio { bytes: bytes.to_vec(), content_type })
    }
}
