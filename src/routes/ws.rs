//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Broadcast frames from deck peers → forward to client
//!
//! Handler functions are pure business logic — they validate, mutate state,
//! and return an `Outcome`. The dispatch layer owns all outbound concerns:
//! persistence, reply to sender, and broadcast to peers.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `client_id`
//! 2. Client sends frames → dispatch → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast / both)
//! 4. Close → `deck:part` cleanup

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::deck::DeckDocument;
use crate::frame::{Data, Frame};
use crate::services;
use crate::services::editor::CommandOutcome;
use crate::state::AppState;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what — handlers never send frames directly.
enum Outcome {
    /// Broadcast done+data to ALL deck clients including sender.
    /// Sender's copy carries `parent_id` for correlation.
    Broadcast(Data),
    /// Send done+data to sender only.
    Reply(Data),
    /// Send empty done to sender only.
    Done,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(ticket) = params.get("ticket") else {
        return (StatusCode::UNAUTHORIZED, "ticket required").into_response();
    };

    let user_id = match services::session::consume_ws_ticket(&state.pool, ticket).await {
        Ok(Some(uid)) => uid,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid or expired ticket").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ws ticket validation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "ticket validation error").into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, user_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user_id: Uuid) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for receiving broadcast frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(256);

    let welcome = Frame::request("session:connected", Data::new())
        .with_data("client_id", client_id.to_string())
        .with_data("user_id", user_id.to_string());
    if send_frame(&mut socket, &state, &welcome).await.is_err() {
        return;
    }

    info!(%client_id, %user_id, "ws: client connected");

    // The deck this client has joined, if any.
    let mut current_deck: Option<String> = None;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let frames =
                            process_inbound_text(&state, &mut current_deck, client_id, user_id, &client_tx, &text).await;
                        for frame in frames {
                            let _ = send_frame(&mut socket, &state, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &state, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(project_id) = current_deck {
        let part_frame = Frame::request("deck:part", Data::new())
            .with_project_id(project_id.clone())
            .with_data("client_id", client_id.to_string());
        broadcast(&state, &project_id, &part_frame, Some(client_id)).await;

        services::editor::part_session(&state, &project_id, client_id).await;
    }
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the
/// sender. Transport-free so tests can exercise dispatch end-to-end.
async fn process_inbound_text(
    state: &AppState,
    current_deck: &mut Option<String>,
    client_id: Uuid,
    user_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    text: &str,
) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    // Stamp the authenticated user_id as `from`.
    req.from = Some(user_id.to_string());

    info!(%client_id, id = %req.id, syscall = %req.syscall, status = ?req.status, "ws: recv frame");
    services::persistence::enqueue_frame(state, &req);

    let result = match req.prefix() {
        "deck" => handle_deck(state, current_deck, client_id, user_id, client_tx, &req).await,
        "editor" => handle_editor(state, current_deck.as_deref(), &req).await,
        "ai" => handle_ai(state, current_deck.as_deref(), client_id, &req).await,
        prefix => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    let project_id = current_deck.clone();
    match result {
        Ok(Outcome::Broadcast(data)) => {
            let sender_frame = req.done_with(data);
            // Peers get a copy without parent_id (they didn't originate it).
            let mut peer_frame = sender_frame.clone();
            peer_frame.id = Uuid::new_v4();
            peer_frame.parent_id = None;
            if let Some(project_id) = &project_id {
                broadcast(state, project_id, &peer_frame, Some(client_id)).await;
            }
            vec![sender_frame]
        }
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// DECK HANDLERS
// =============================================================================

async fn handle_deck(
    state: &AppState,
    current_deck: &mut Option<String>,
    client_id: Uuid,
    user_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    req: &Frame,
) -> Result<Outcome, Frame> {
    match req.op() {
        "join" => {
            let Some(project_id) = req.project_id.clone().or_else(|| {
                req.data
                    .get("project_id")
                    .and_then(|v| v.as_str())
                    .map(String::from)
            }) else {
                return Err(req.error("project_id required"));
            };

            // Only the owner may attach an editor session.
            if let Err(e) = services::deck::get_deck_owned(&state.pool, &project_id, user_id).await {
                return Err(req.error_from(&e));
            }

            // Part the previous deck if already joined.
            if let Some(old) = current_deck.take() {
                services::editor::part_session(state, &old, client_id).await;
            }

            match services::editor::join_session(state, &project_id, client_id, client_tx.clone()).await {
                Ok(document) => {
                    *current_deck = Some(project_id);
                    let mut reply = Data::new();
                    reply.insert("document".into(), serde_json::to_value(&document).unwrap_or_default());
                    Ok(Outcome::Reply(reply))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "part" => {
            if let Some(project_id) = current_deck.take() {
                services::editor::part_session(state, &project_id, client_id).await;
            }
            Ok(Outcome::Done)
        }
        "save" => {
            let Some(project_id) = current_deck.as_deref() else {
                return Err(req.error("must join a deck first"));
            };

            // The document arrives as parsed JSON or its serialized form.
            let document = match req.data.get("project") {
                Some(serde_json::Value::String(raw)) => DeckDocument::from_json(raw),
                Some(value) => serde_json::from_value::<DeckDocument>(value.clone()),
                None => return Err(req.error("project required")),
            };
            let document = match document {
                Ok(doc) => doc,
                Err(e) => return Err(req.error(format!("invalid project document: {e}"))),
            };

            match services::editor::set_document(state, project_id, document).await {
                Ok(()) => Ok(Outcome::Done),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        op => Err(req.error(format!("unknown deck op: {op}"))),
    }
}

// =============================================================================
// EDITOR HANDLERS
// =============================================================================

async fn handle_editor(state: &AppState, current_deck: Option<&str>, req: &Frame) -> Result<Outcome, Frame> {
    let Some(project_id) = current_deck else {
        return Err(req.error("must join a deck first"));
    };

    match req.op() {
        op @ ("addSlide" | "replaceSlide" | "deleteSlide") => {
            let command_value = serde_json::json!({ "command": op, "data": req.data.clone() });
            match services::editor::apply_command_value(state, project_id, None, &command_value).await {
                Ok(outcome) if outcome.applied() => {
                    let mut data = Data::new();
                    data.insert("command".into(), serde_json::json!(op));
                    data.insert("applied".into(), serde_json::json!(true));
                    for (key, value) in &req.data {
                        data.insert(key.clone(), value.clone());
                    }
                    Ok(Outcome::Broadcast(data))
                }
                Ok(CommandOutcome::Noop) => Err(req.error(format!("malformed editor command: {op}"))),
                Ok(_) => Ok(Outcome::Done),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "renameSlide" => {
            let Some(index) = req
                .data
                .get("slideIndex")
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| usize::try_from(v).ok())
            else {
                return Err(req.error("slideIndex required"));
            };
            let name = req.data.get("name").and_then(|v| v.as_str()).unwrap_or("");

            match services::editor::rename_slide(state, project_id, index, name).await {
                Ok(()) => {
                    let mut data = Data::new();
                    data.insert("slideIndex".into(), serde_json::json!(index));
                    data.insert("name".into(), serde_json::json!(name));
                    Ok(Outcome::Broadcast(data))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "selectSlide" => {
            let index = req
                .data
                .get("slideIndex")
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(0);
            services::editor::select_slide(state, project_id, index).await;
            Ok(Outcome::Done)
        }
        op => Err(req.error(format!("unknown editor op: {op}"))),
    }
}

// =============================================================================
// AI HANDLERS (exception: broadcasts applied commands directly)
// =============================================================================

async fn handle_ai(
    state: &AppState,
    current_deck: Option<&str>,
    client_id: Uuid,
    req: &Frame,
) -> Result<Outcome, Frame> {
    let Some(project_id) = current_deck else {
        return Err(req.error("must join a deck first"));
    };

    match req.op() {
        "prompt" => {
            let Some(llm) = &state.llm else {
                return Err(req.error("AI features not configured"));
            };

            let prompt = req
                .data
                .get("prompt")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if prompt.is_empty() {
                return Err(req.error("prompt required"));
            }

            match services::ai::handle_prompt(state, llm, project_id, client_id, prompt).await {
                Ok(outcome) => {
                    // Applied commands reach every client (sender included)
                    // through the same editor:* frames user edits produce.
                    for applied in outcome.commands.iter().filter(|c| c.applied) {
                        let mut data = command_to_data(&applied.command);
                        data.insert("tool_call".into(), serde_json::json!(applied.key));
                        let frame = Frame::request(applied.command.syscall(), data).with_project_id(project_id);
                        broadcast(state, project_id, &frame, None).await;
                    }

                    let mut data = Data::new();
                    if let Some(text) = &outcome.text {
                        data.insert("text".into(), serde_json::json!(text));
                    }
                    data.insert(
                        "commands".into(),
                        serde_json::json!(outcome.commands.iter().filter(|c| c.applied).count()),
                    );
                    Ok(Outcome::Reply(data))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "cancel" => {
            let sessions = state.sessions.read().await;
            if let Some(session) = sessions.get(project_id) {
                session
                    .ai_cancel
                    .store(true, std::sync::atomic::Ordering::Relaxed);
            }
            Ok(Outcome::Done)
        }
        "reset" => {
            services::editor::reset_chat(state, project_id).await;
            Ok(Outcome::Done)
        }
        op => Err(req.error(format!("unknown ai op: {op}"))),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Broadcast a frame to all clients attached to a deck session, optionally
/// excluding one.
pub(crate) async fn broadcast(state: &AppState, project_id: &str, frame: &Frame, exclude: Option<Uuid>) {
    services::persistence::enqueue_frame(state, frame);

    let sessions = state.sessions.read().await;
    let Some(session) = sessions.get(project_id) else {
        return;
    };

    for (client_id, tx) in &session.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: if a client's channel is full, skip it.
        let _ = tx.try_send(frame.clone());
    }
}

fn command_to_data(command: &services::editor::ToolCommand) -> Data {
    match serde_json::to_value(command) {
        Ok(serde_json::Value::Object(map)) => map
            .get("data")
            .and_then(|d| d.as_object())
            .map(|data| data.clone().into_iter().collect())
            .unwrap_or_default(),
        _ => Data::new(),
    }
}

async fn send_frame(socket: &mut WebSocket, state: &AppState, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };

    if frame.status == crate::frame::Status::Error {
        let code = frame.data.get("code").and_then(|v| v.as_str()).unwrap_or("-");
        let message = frame
            .data
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }

    let result = socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ());
    if result.is_ok() {
        services::persistence::enqueue_frame(state, frame);
    }
    result
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
