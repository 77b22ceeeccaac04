//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the REST API (auth, deck CRUD, exports, narration) and the
//! websocket endpoint under a single Axum router. The editing frontend is a
//! separate application; this service is API-only.

pub mod auth;
pub mod decks;
pub mod present;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/session", post(auth::exchange_session))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/ws-ticket", post(auth::ws_ticket))
        .route("/api/deck", get(decks::list_decks).post(decks::save_deck))
        .route("/api/deck/bulk-delete", post(decks::bulk_delete_decks))
        .route(
            "/api/deck/{project_id}",
            get(decks::get_deck)
                .patch(decks::update_deck)
                .delete(decks::delete_deck),
        )
        .route("/api/deck/{project_id}/duplicate", post(decks::duplicate_deck))
        .route("/api/deck/{project_id}/export.html", get(present::export_plain))
        .route("/api/deck/{project_id}/export-voice.html", get(present::export_voice))
        .route("/api/narration/{project_id}", get(present::read_cache))
        .route("/api/narration/{project_id}/generate", post(present::generate))
        .route("/api/narration/{project_id}/audio/{audio_id}", get(present::audio))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
