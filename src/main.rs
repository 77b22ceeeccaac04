mod db;
mod deck;
mod frame;
mod llm;
mod rate_limit;
mod routes;
mod services;
mod state;
mod tts;

use std::sync::Arc;

use crate::llm::LlmChat;
use crate::tts::SpeechSynth;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    // LLM and TTS clients are optional: missing configuration disables the
    // feature instead of failing startup.
    let llm: Option<Arc<dyn LlmChat>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "LLM client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client not configured — AI features disabled");
            None
        }
    };
    let tts: Option<Arc<dyn SpeechSynth>> = match tts::client::TtsClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "TTS client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "TTS client not configured — narration disabled");
            None
        }
    };

    let mut state = state::AppState::new(pool.clone(), llm, tts);
    state.frame_persist_tx = Some(services::persistence::spawn_frame_persistence_worker(pool));

    // Background flush for dirty editor sessions.
    let _session_flush = services::persistence::spawn_session_flush_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "chalktalk listening");
    axum::serve(listener, app).await.expect("server failed");
}
