//! Editor service — live sessions and the command executor.
//!
//! DESIGN
//! ======
//! The live editor instance for a deck is an [`EditorSession`]: hydrated from
//! Postgres when the first client attaches, mutated exclusively through
//! [`apply_command`], evicted after the last client leaves. Commands are pure
//! data produced by the AI write tools (or by clients directly); producing a
//! command never mutates anything — application happens here, exactly once
//! per tool-call id.
//!
//! ERROR HANDLING
//! ==============
//! Applied writes mark the session dirty and attempt an immediate save so
//! the next read-tool call sees fresh state; a failed save keeps the dirty
//! flag for the background flush rather than failing the command.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::deck::{DeckDocument, Page, PageContent};
use crate::frame::Frame;
use crate::state::{AppState, EditorSession};

use super::deck::{self, DeckError};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("deck session not loaded: {0}")]
    SessionNotLoaded(String),
    #[error("slide {index} not found (deck has {total} slides)")]
    SlideNotFound { index: usize, total: usize },
    #[error("deck {0} could not be parsed")]
    ParseFailure(String),
    #[error("deck error: {0}")]
    Deck(#[from] DeckError),
}

impl crate::frame::ErrorCode for EditorError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::SessionNotLoaded(_) => "E_SESSION_NOT_LOADED",
            Self::SlideNotFound { .. } => "E_SLIDE_NOT_FOUND",
            Self::ParseFailure(_) => "E_PARSE",
            Self::Deck(e) => e.error_code(),
        }
    }
}

/// Declarative mutation descriptor. Pure data — producing one never touches
/// the live editor, so the same shape can be replayed or logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "data")]
pub enum ToolCommand {
    #[serde(rename = "addSlide")]
    AddSlide {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        content: String,
        #[serde(rename = "insertAtIndex", skip_serializing_if = "Option::is_none")]
        insert_at_index: Option<usize>,
    },
    #[serde(rename = "replaceSlide")]
    ReplaceSlide {
        #[serde(rename = "slideIndex")]
        slide_index: usize,
        #[serde(rename = "newContent")]
        new_content: String,
        #[serde(rename = "newName", skip_serializing_if = "Option::is_none")]
        new_name: Option<String>,
    },
    #[serde(rename = "deleteSlide")]
    DeleteSlide {
        #[serde(rename = "slideIndex")]
        slide_index: usize,
    },
}

impl ToolCommand {
    /// Syscall name for broadcasting an applied command to peers.
    #[must_use]
    pub fn syscall(&self) -> &'static str {
        match self {
            Self::AddSlide { .. } => "editor:addSlide",
            Self::ReplaceSlide { .. } => "editor:replaceSlide",
            Self::DeleteSlide { .. } => "editor:deleteSlide",
        }
    }
}

/// Result of one executor pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The mutation was applied to the live document.
    Applied,
    /// The tool-call id was already in the executed-command record.
    AlreadyExecuted,
    /// The command named an unknown or unsupported operation.
    Noop,
}

impl CommandOutcome {
    #[must_use]
    pub fn applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

// =============================================================================
// SESSION LIFECYCLE
// =============================================================================

/// Attach a client to a deck's live session, hydrating from Postgres when
/// this is the first client. Returns a snapshot of the live document.
///
/// # Errors
///
/// `NotFound` for a missing deck, `ParseFailure` when the stored document is
/// undecodable (a broken deck cannot host a live session).
pub async fn join_session(
    state: &AppState,
    project_id: &str,
    client_id: Uuid,
    tx: mpsc::Sender<Frame>,
) -> Result<DeckDocument, EditorError> {
    // Fetch outside the lock; apply only when this client is first in.
    let record = deck::get_deck(&state.pool, project_id).await?;
    let hydrated = record
        .document
        .ok_or_else(|| EditorError::ParseFailure(project_id.to_string()))?;

    let mut sessions = state.sessions.write().await;
    let session = sessions
        .entry(project_id.to_string())
        .or_insert_with(|| EditorSession::new(DeckDocument::default()));

    if session.clients.is_empty() {
        session.document = hydrated;
        session.dirty = false;
        info!(%project_id, pages = session.document.page_count(), "hydrated deck session");
    }
    session.clients.insert(client_id, tx);

    info!(%project_id, %client_id, clients = session.clients.len(), "client joined deck session");
    Ok(session.document.clone())
}

/// Detach a client. The last client out flushes a dirty document and evicts
/// the session; a failed flush keeps the session (and its dirty flag) so the
/// background task can retry instead of losing edits.
pub async fn part_session(state: &AppState, project_id: &str, client_id: Uuid) {
    let flush_snapshot = {
        let mut sessions = state.sessions.write().await;
        let Some(session) = sessions.get_mut(project_id) else {
            return;
        };
        session.clients.remove(&client_id);
        info!(%project_id, %client_id, remaining = session.clients.len(), "client left deck session");

        if !session.clients.is_empty() {
            return;
        }
        if !session.dirty {
            sessions.remove(project_id);
            info!(%project_id, "evicted deck session");
            return;
        }
        (session.document.clone(), session.revision)
    };

    let (document, revision) = flush_snapshot;
    let flush_result = deck::persist_document(&state.pool, project_id, &document).await;

    let mut sessions = state.sessions.write().await;
    let Some(session) = sessions.get_mut(project_id) else {
        return;
    };
    if !session.clients.is_empty() {
        return;
    }
    match flush_result {
        Ok(()) if session.revision == revision => {
            sessions.remove(project_id);
            info!(%project_id, "evicted deck session after final flush");
        }
        Ok(()) => {
            warn!(%project_id, "retaining deck session: edited again during final flush");
        }
        Err(e) => {
            warn!(error = %e, %project_id, "final flush failed; deck session retained for retry");
        }
    }
}

/// Replace the live document wholesale (UI autosave path). Marks dirty.
///
/// # Errors
///
/// `SessionNotLoaded` when no live session exists for the deck.
pub async fn set_document(state: &AppState, project_id: &str, document: DeckDocument) -> Result<(), EditorError> {
    let mut sessions = state.sessions.write().await;
    let session = sessions
        .get_mut(project_id)
        .ok_or_else(|| EditorError::SessionNotLoaded(project_id.to_string()))?;
    session.document = document;
    session.dirty = true;
    session.revision += 1;
    Ok(())
}

/// Select a page in the live session. Out-of-range indices clamp.
pub async fn select_slide(state: &AppState, project_id: &str, index: usize) {
    let mut sessions = state.sessions.write().await;
    if let Some(session) = sessions.get_mut(project_id) {
        session.selected = index.min(session.document.page_count().saturating_sub(1));
    }
}

/// Rename a page in the live session. Marks dirty.
///
/// # Errors
///
/// `SessionNotLoaded` / `SlideNotFound`.
pub async fn rename_slide(state: &AppState, project_id: &str, index: usize, name: &str) -> Result<(), EditorError> {
    let mut sessions = state.sessions.write().await;
    let session = sessions
        .get_mut(project_id)
        .ok_or_else(|| EditorError::SessionNotLoaded(project_id.to_string()))?;
    let total = session.document.page_count();
    let page = session
        .document
        .pages
        .get_mut(index)
        .ok_or(EditorError::SlideNotFound { index, total })?;
    page.name = name.to_string();
    session.dirty = true;
    session.revision += 1;
    Ok(())
}

/// Clear the chat-scoped executed-command record and cancellation flag.
/// Invoked on "new chat".
pub async fn reset_chat(state: &AppState, project_id: &str) {
    let mut sessions = state.sessions.write().await;
    if let Some(session) = sessions.get_mut(project_id) {
        session.executed_commands.clear();
        session
            .ai_cancel
            .store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

// =============================================================================
// COMMAND EXECUTOR
// =============================================================================

/// Apply one declarative command to the live session.
///
/// `dedup_key` is the tool-call id (`"{message_id}-tool-{part_index}"`) for
/// AI-produced commands; it is recorded whatever the outcome so replaying the
/// same chat history applies nothing twice. Direct client edits pass `None`
/// and are never deduplicated.
///
/// # Errors
///
/// `SessionNotLoaded` / `SlideNotFound`; a successful apply with a failed
/// immediate save is NOT an error (the dirty flag covers it).
pub async fn apply_command(
    state: &AppState,
    project_id: &str,
    dedup_key: Option<&str>,
    command: &ToolCommand,
) -> Result<CommandOutcome, EditorError> {
    let outcome = {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(project_id)
            .ok_or_else(|| EditorError::SessionNotLoaded(project_id.to_string()))?;

        if let Some(key) = dedup_key {
            if session.executed_commands.contains(key) {
                return Ok(CommandOutcome::AlreadyExecuted);
            }
            session.executed_commands.insert(key.to_string());
        }

        dispatch(session, command)?
    };

    if outcome.applied() {
        // Save immediately so a subsequent read-tool call sees the edit;
        // failure falls back to the background flush.
        let snapshot = {
            let sessions = state.sessions.read().await;
            sessions
                .get(project_id)
                .map(|s| (s.document.clone(), s.revision))
        };
        if let Some((document, revision)) = snapshot {
            if let Err(e) = deck::persist_document(&state.pool, project_id, &document).await {
                warn!(error = %e, %project_id, "post-command save failed; dirty flag retained");
            } else {
                clear_dirty_at_revision(state, project_id, revision).await;
            }
        }
    }

    Ok(outcome)
}

/// Parse and apply a command arriving as raw frame data. Undecodable or
/// unknown commands are a no-op reported as such, never an error.
pub async fn apply_command_value(
    state: &AppState,
    project_id: &str,
    dedup_key: Option<&str>,
    value: &serde_json::Value,
) -> Result<CommandOutcome, EditorError> {
    match serde_json::from_value::<ToolCommand>(value.clone()) {
        Ok(command) => apply_command(state, project_id, dedup_key, &command).await,
        Err(e) => {
            warn!(%project_id, error = %e, "unknown editor command; ignoring");
            Ok(CommandOutcome::Noop)
        }
    }
}

fn dispatch(session: &mut EditorSession, command: &ToolCommand) -> Result<CommandOutcome, EditorError> {
    let total = session.document.page_count();
    match command {
        ToolCommand::AddSlide { name, content, insert_at_index } => {
            let index = insert_at_index.unwrap_or(total).min(total);
            let name = name
                .clone()
                .unwrap_or_else(|| format!("Slide {}", index + 1));
            session
                .document
                .pages
                .insert(index, Page { name, component: PageContent::Html(content.clone()), extra: serde_json::Map::new() });
            session.selected = index;
        }
        ToolCommand::ReplaceSlide { slide_index, new_content, new_name } => {
            let page = session
                .document
                .pages
                .get_mut(*slide_index)
                .ok_or(EditorError::SlideNotFound { index: *slide_index, total })?;
            page.component = PageContent::Html(new_content.clone());
            if let Some(name) = new_name {
                page.name = name.clone();
            }
        }
        ToolCommand::DeleteSlide { slide_index } => {
            if *slide_index >= total {
                return Err(EditorError::SlideNotFound { index: *slide_index, total });
            }
            session.document.pages.remove(*slide_index);
            session.selected = session
                .selected
                .min(session.document.page_count().saturating_sub(1));
        }
    }

    session.dirty = true;
    session.revision += 1;
    Ok(CommandOutcome::Applied)
}

async fn clear_dirty_at_revision(state: &AppState, project_id: &str, revision: u64) {
    let mut sessions = state.sessions.write().await;
    if let Some(session) = sessions.get_mut(project_id) {
        // A concurrent edit since the persisted snapshot keeps the flag set.
        if session.revision == revision {
            session.dirty = false;
        }
    }
}

#[cfg(test)]
#[path = "editor_test.rs"]
mod tests;
