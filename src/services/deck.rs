//! Deck service — CRUD over persisted decks.
//!
//! DESIGN
//! ======
//! A deck row is created on first save and addressed by its externally
//! generated `project_id`. The `project` column is the JSON document; it is
//! parsed on read but a decode failure degrades to the raw record (the
//! caller gets everything except the parsed document) instead of failing the
//! read — enough survives for manual recovery.
//!
//! ERROR HANDLING
//! ==============
//! Ownership is checked on every mutation; `Unauthorized` is distinct from
//! `NotFound` so the UI can word dialog failures correctly.

use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::deck::DeckDocument;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("deck not found: {0}")]
    NotFound(String),
    #[error("not the owner of deck {0}")]
    Unauthorized(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::frame::ErrorCode for DeckError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_DECK_NOT_FOUND",
            Self::Unauthorized(_) => "E_UNAUTHORIZED",
            Self::Database(_) => "E_DATABASE",
        }
    }
}

/// Full persisted deck record. `document` is `None` when the stored JSON
/// could not be decoded.
#[derive(Debug, Clone)]
pub struct DeckRecord {
    pub project_id: String,
    pub title: Option<String>,
    pub project: String,
    pub owner_id: Uuid,
    pub document: Option<DeckDocument>,
}

/// Row shape for deck listings.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeckSummary {
    pub project_id: String,
    pub title: Option<String>,
}

// =============================================================================
// READ
// =============================================================================

/// Fetch a deck by project id, parsing the document when possible.
///
/// # Errors
///
/// Returns `NotFound` when no row exists or a database error. A JSON decode
/// failure is NOT an error: the record comes back with `document: None`.
pub async fn get_deck(pool: &PgPool, project_id: &str) -> Result<DeckRecord, DeckError> {
    let row = sqlx::query_as::<_, (String, Option<String>, String, Uuid)>(
        "SELECT project_id, title, project, owner_id FROM decks WHERE project_id = $1",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DeckError::NotFound(project_id.to_string()))?;

    let (project_id, title, project, owner_id) = row;
    let document = match DeckDocument::from_json(&project) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(%project_id, error = %e, "deck project JSON undecodable; returning raw record");
            None
        }
    };

    Ok(DeckRecord { project_id, title, project, owner_id, document })
}

/// Fetch a deck and require the caller to own it.
///
/// # Errors
///
/// `NotFound` / `Unauthorized` / database errors.
pub async fn get_deck_owned(pool: &PgPool, project_id: &str, user_id: Uuid) -> Result<DeckRecord, DeckError> {
    let record = get_deck(pool, project_id).await?;
    if record.owner_id != user_id {
        return Err(DeckError::Unauthorized(project_id.to_string()));
    }
    Ok(record)
}

/// List the caller's decks, most recently updated first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_decks(pool: &PgPool, user_id: Uuid) -> Result<Vec<DeckSummary>, DeckError> {
    let rows = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT project_id, title FROM decks WHERE owner_id = $1 ORDER BY updated_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(project_id, title)| DeckSummary { project_id, title })
        .collect())
}

// =============================================================================
// CREATE / SAVE
// =============================================================================

/// Create a deck on first save, or update it when the caller already owns
/// it. `title` and `project` update only when provided.
///
/// # Errors
///
/// `Unauthorized` when the deck exists under another owner.
pub async fn save_deck(
    pool: &PgPool,
    project_id: &str,
    user_id: Uuid,
    title: Option<&str>,
    project: Option<&str>,
) -> Result<DeckRecord, DeckError> {
    let existing_owner: Option<Uuid> =
        sqlx::query_scalar("SELECT owner_id FROM decks WHERE project_id = $1")
            .bind(project_id)
            .fetch_optional(pool)
            .await?;

    match existing_owner {
        Some(owner) if owner != user_id => return Err(DeckError::Unauthorized(project_id.to_string())),
        Some(_) => {
            sqlx::query(
                "UPDATE decks SET title = COALESCE($2, title), project = COALESCE($3, project), updated_at = now() \
                 WHERE project_id = $1",
            )
            .bind(project_id)
            .bind(title)
            .bind(project)
            .execute(pool)
            .await?;
        }
        None => {
            let project = project.unwrap_or("{\"pages\":[]}");
            sqlx::query("INSERT INTO decks (project_id, title, project, owner_id) VALUES ($1, $2, $3, $4)")
                .bind(project_id)
                .bind(title)
                .bind(project)
                .bind(user_id)
                .execute(pool)
                .await?;
        }
    }

    get_deck(pool, project_id).await
}

/// Persist a live document, replacing the stored `project` JSON.
///
/// # Errors
///
/// `NotFound` when the deck row is gone, or a database error.
pub async fn persist_document(pool: &PgPool, project_id: &str, document: &DeckDocument) -> Result<(), DeckError> {
    let result = sqlx::query("UPDATE decks SET project = $2, updated_at = now() WHERE project_id = $1")
        .bind(project_id)
        .bind(document.to_json())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DeckError::NotFound(project_id.to_string()));
    }
    Ok(())
}

// =============================================================================
// DELETE / DUPLICATE
// =============================================================================

/// Delete one deck the caller owns.
///
/// # Errors
///
/// `NotFound` when no owned row was deleted.
pub async fn delete_deck(pool: &PgPool, project_id: &str, user_id: Uuid) -> Result<(), DeckError> {
    let result = sqlx::query("DELETE FROM decks WHERE project_id = $1 AND owner_id = $2")
        .bind(project_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DeckError::NotFound(project_id.to_string()));
    }
    Ok(())
}

/// Delete a batch of decks the caller owns; returns how many went away.
/// Rows the caller does not own are skipped, not errors.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn bulk_delete_decks(pool: &PgPool, project_ids: &[String], user_id: Uuid) -> Result<u64, DeckError> {
    if project_ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query("DELETE FROM decks WHERE project_id = ANY($1) AND owner_id = $2")
        .bind(project_ids)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Copy a deck into a new project id owned by the caller.
///
/// # Errors
///
/// `NotFound`/`Unauthorized` for the source; database errors otherwise.
pub async fn duplicate_deck(
    pool: &PgPool,
    project_id: &str,
    new_project_id: &str,
    user_id: Uuid,
) -> Result<DeckRecord, DeckError> {
    let source = get_deck_owned(pool, project_id, user_id).await?;
    let title = source.title.map(|t| format!("{t} (copy)"));

    sqlx::query("INSERT INTO decks (project_id, title, project, owner_id) VALUES ($1, $2, $3, $4)")
        .bind(new_project_id)
        .bind(title)
        .bind(&source.project)
        .bind(user_id)
        .execute(pool)
        .await?;

    get_deck(pool, new_project_id).await
}

#[cfg(test)]
#[path = "deck_test.rs"]
mod tests;
