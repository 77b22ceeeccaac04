//! Presentation routes — static exports and the narration cache surface.
//!
//! DESIGN
//! ======
//! Exports are recomputed from the persisted document on every request;
//! nothing derived is stored. The narrated export reads the audio cache and
//! references blobs by URL; the blobs themselves stream from
//! `/api/narration/{project_id}/audio/{audio_id}`.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Json, Response};
use uuid::Uuid;

use crate::deck::{export, reveal, SlideFormat};
use crate::routes::auth::AuthUser;
use crate::routes::decks::deck_error_to_status;
use crate::services::deck;
use crate::services::narration::{self, NarrationError};
use crate::state::AppState;

fn narration_error_to_status(err: NarrationError) -> StatusCode {
    match err {
        NarrationError::TtsNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        NarrationError::Deck(e) => deck_error_to_status(e),
        NarrationError::Synthesis { .. } => StatusCode::BAD_GATEWAY,
        NarrationError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn owned_slides(
    state: &AppState,
    project_id: &str,
    user_id: Uuid,
) -> Result<(String, Vec<reveal::RevealSlide>), StatusCode> {
    let record = deck::get_deck_owned(&state.pool, project_id, user_id)
        .await
        .map_err(deck_error_to_status)?;
    let title = record.title.unwrap_or_else(|| project_id.to_string());
    let document = record.document.unwrap_or_default();
    Ok((title, reveal::extract_reveal_slides(&document)))
}

// =============================================================================
// EXPORTS
// =============================================================================

/// `GET /api/deck/{project_id}/export.html` — plain presentation export.
pub async fn export_plain(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Html<String>, StatusCode> {
    let (title, slides) = owned_slides(&state, &project_id, auth.user.id).await?;
    Ok(Html(export::render_presentation(&title, &slides, SlideFormat::default())))
}

/// `GET /api/deck/{project_id}/export-voice.html` — narrated export.
pub async fn export_voice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Html<String>, StatusCode> {
    let (title, slides) = owned_slides(&state, &project_id, auth.user.id).await?;

    let rows = narration::load_narration(&state.pool, &project_id)
        .await
        .map_err(narration_error_to_status)?;
    let narration_map: HashMap<usize, Vec<export::NarratedFragment>> = narration::group_by_slide(rows)
        .into_iter()
        .map(|(slide_index, fragments)| {
            let fragments = fragments
                .into_iter()
                .map(|row| export::NarratedFragment {
                    duration_ms: row.duration_ms,
                    audio_src: format!("/api/narration/{project_id}/audio/{}", row.audio_id),
                })
                .collect();
            (slide_index, fragments)
        })
        .collect();

    Ok(Html(export::render_narrated_presentation(
        &title,
        &slides,
        &narration_map,
        SlideFormat::default(),
    )))
}

// =============================================================================
// NARRATION CACHE
// =============================================================================

/// `POST /api/narration/{project_id}/generate` — regenerate the audio cache.
pub async fn generate(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<narration::NarrationSummary>, StatusCode> {
    deck::get_deck_owned(&state.pool, &project_id, auth.user.id)
        .await
        .map_err(deck_error_to_status)?;

    let summary = narration::generate_narration(&state, &project_id)
        .await
        .map_err(narration_error_to_status)?;
    Ok(Json(summary))
}

/// `GET /api/narration/{project_id}` — read the cached fragment mapping.
pub async fn read_cache(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    deck::get_deck_owned(&state.pool, &project_id, auth.user.id)
        .await
        .map_err(deck_error_to_status)?;

    let rows = narration::load_narration(&state.pool, &project_id)
        .await
        .map_err(narration_error_to_status)?;

    let mut by_slide: serde_json::Map<String, serde_json::Value> = serde_json::Map::new();
    for (slide_index, fragments) in narration::group_by_slide(rows) {
        let entries: Vec<serde_json::Value> = fragments
            .into_iter()
            .map(|row| {
                serde_json::json!({
                    "ttsText": row.tts_text,
                    "audioFileRef": row.audio_id,
                    "durationMs": row.duration_ms,
                })
            })
            .collect();
        by_slide.insert(slide_index.to_string(), serde_json::Value::Array(entries));
    }

    Ok(Json(serde_json::Value::Object(by_slide)))
}

/// `GET /api/narration/{project_id}/audio/{audio_id}` — stream one cached
/// audio blob. Token-less: exported documents reference these URLs from
/// plain `<audio>` elements, which cannot attach bearer headers.
pub async fn audio(
    State(state): State<AppState>,
    Path((project_id, audio_id)): Path<(String, Uuid)>,
) -> Result<Response, StatusCode> {
    let Some((content_type, bytes)) = narration::get_audio(&state.pool, &project_id, audio_id)
        .await
        .map_err(narration_error_to_status)?
    else {
        return Err(StatusCode::NOT_FOUND);
    };

    Ok(([(CONTENT_TYPE, content_type)], bytes).into_response())
}
