//! Deck REST routes — CRUD, rename, duplicate, bulk delete.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::routes::auth::AuthUser;
use crate::services::deck::{self, DeckError, DeckRecord};
use crate::state::AppState;

// =============================================================================
// WIRE SHAPES
// =============================================================================

#[derive(Serialize)]
pub struct DeckResponse {
    pub project_id: String,
    pub title: Option<String>,
    /// Raw serialized document. Always present, even when parsing failed.
    pub project: String,
    pub owner_id: Uuid,
    /// Parsed document; `null` when the stored JSON is undecodable, in which
    /// case callers work from `project`.
    pub document: Option<crate::deck::DeckDocument>,
}

fn to_response(record: DeckRecord) -> DeckResponse {
    DeckResponse {
        project_id: record.project_id,
        title: record.title,
        project: record.project,
        owner_id: record.owner_id,
        document: record.document,
    }
}

pub(crate) fn deck_error_to_status(err: DeckError) -> StatusCode {
    match err {
        DeckError::NotFound(_) => StatusCode::NOT_FOUND,
        DeckError::Unauthorized(_) => StatusCode::FORBIDDEN,
        DeckError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct SaveDeckBody {
    pub project_id: String,
    pub title: Option<String>,
    pub project: Option<String>,
}

/// `POST /api/deck` — create a deck on first save (or update an owned one).
pub async fn save_deck(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SaveDeckBody>,
) -> Result<(StatusCode, Json<DeckResponse>), StatusCode> {
    if body.project_id.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let record = deck::save_deck(
        &state.pool,
        &body.project_id,
        auth.user.id,
        body.title.as_deref(),
        body.project.as_deref(),
    )
    .await
    .map_err(deck_error_to_status)?;
    Ok((StatusCode::CREATED, Json(to_response(record))))
}

/// `GET /api/deck` — list the caller's decks.
pub async fn list_decks(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<deck::DeckSummary>>, StatusCode> {
    let rows = deck::list_decks(&state.pool, auth.user.id)
        .await
        .map_err(deck_error_to_status)?;
    Ok(Json(rows))
}

/// `GET /api/deck/{project_id}` — fetch one owned deck.
pub async fn get_deck(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<DeckResponse>, StatusCode> {
    let record = deck::get_deck_owned(&state.pool, &project_id, auth.user.id)
        .await
        .map_err(deck_error_to_status)?;
    Ok(Json(to_response(record)))
}

#[derive(Deserialize)]
pub struct UpdateDeckBody {
    pub title: Option<String>,
    pub project: Option<String>,
}

/// `PATCH /api/deck/{project_id}` — rename and/or autosave the document.
pub async fn update_deck(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<UpdateDeckBody>,
) -> Result<Json<DeckResponse>, StatusCode> {
    // Distinguish not-found from first-save: PATCH never creates.
    deck::get_deck_owned(&state.pool, &project_id, auth.user.id)
        .await
        .map_err(deck_error_to_status)?;

    let record = deck::save_deck(
        &state.pool,
        &project_id,
        auth.user.id,
        body.title.as_deref(),
        body.project.as_deref(),
    )
    .await
    .map_err(deck_error_to_status)?;
    Ok(Json(to_response(record)))
}

/// `DELETE /api/deck/{project_id}` — delete one owned deck.
pub async fn delete_deck(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    deck::delete_deck(&state.pool, &project_id, auth.user.id)
        .await
        .map_err(deck_error_to_status)?;

    {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&project_id);
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct BulkDeleteBody {
    pub project_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

/// `POST /api/deck/bulk-delete` — delete a batch of owned decks.
pub async fn bulk_delete_decks(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<BulkDeleteBody>,
) -> Result<Json<BulkDeleteResponse>, StatusCode> {
    let deleted = deck::bulk_delete_decks(&state.pool, &body.project_ids, auth.user.id)
        .await
        .map_err(deck_error_to_status)?;

    {
        let mut sessions = state.sessions.write().await;
        for project_id in &body.project_ids {
            sessions.remove(project_id);
        }
    }

    Ok(Json(BulkDeleteResponse { deleted }))
}

#[derive(Deserialize)]
pub struct DuplicateBody {
    pub new_project_id: String,
}

/// `POST /api/deck/{project_id}/duplicate` — copy a deck under a new
/// externally generated project id.
pub async fn duplicate_deck(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<DuplicateBody>,
) -> Result<(StatusCode, Json<DeckResponse>), StatusCode> {
    if body.new_project_id.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let record = deck::duplicate_deck(&state.pool, &project_id, &body.new_project_id, auth.user.id)
        .await
        .map_err(deck_error_to_status)?;
    Ok((StatusCode::CREATED, Json(to_response(record))))
}

#[cfg(test)]
#[path = "decks_test.rs"]
mod tests;
