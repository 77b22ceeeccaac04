//! Auth routes — session exchange, bearer auth, WS tickets.
//!
//! SYSTEM CONTEXT
//! ==============
//! Identity verification happens outside this service. A trusted frontend
//! (holding the shared exchange secret) trades its verified user for a
//! bearer session token here; every other route authenticates with that
//! token via the [`AuthUser`] extractor.

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::session;
use crate::state::AppState;

const EXCHANGE_SECRET_ENV: &str = "AUTH_EXCHANGE_SECRET";

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user extracted from the `Authorization: Bearer` header.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: session::SessionUser,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .unwrap_or_default();
        if token.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let app_state = AppState::from_ref(state);
        let user = session::validate_session(&app_state.pool, token)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(Self { user, token: token.to_owned() })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct ExchangeBody {
    pub user_id: Uuid,
    pub name: String,
    pub secret: String,
}

/// `POST /api/auth/session` — exchange an externally verified identity for a
/// bearer session token. Gated by the shared exchange secret.
pub async fn exchange_session(
    State(state): State<AppState>,
    Json(body): Json<ExchangeBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let expected = std::env::var(EXCHANGE_SECRET_ENV).map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    if expected.is_empty() || body.secret != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = session::open_session(&state.pool, body.user_id, &body.name)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(serde_json::json!({ "token": token })))
}

/// `GET /api/auth/me` — current session user.
pub async fn me(auth: AuthUser) -> Json<session::SessionUser> {
    Json(auth.user)
}

/// `POST /api/auth/logout` — delete the current session.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> Result<Json<serde_json::Value>, StatusCode> {
    session::close_session(&state.pool, &auth.token)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `POST /api/auth/ws-ticket` — issue a one-time websocket ticket.
pub async fn ws_ticket(State(state): State<AppState>, auth: AuthUser) -> Result<Json<serde_json::Value>, StatusCode> {
    let ticket = session::issue_ws_ticket(&state.pool, auth.user.id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::json!({ "ticket": ticket })))
}
