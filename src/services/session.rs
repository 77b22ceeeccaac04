//! Session and WS-ticket management.
//!
//! ARCHITECTURE
//! ============
//! Identity itself is external: a trusted frontend exchanges its verified
//! user for a bearer session here. HTTP auth then uses long-lived session
//! tokens, while websocket upgrades use one-time short-lived tickets so
//! tokens never ride in WS query params.
//!
//! TRADE-OFFS
//! ==========
//! Ticket consumption is destructive (`DELETE ... RETURNING`) to guarantee
//! single use; this favors replay safety over reconnect convenience.

use std::fmt::Write;

use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Generate a short-lived 16-byte hex WS ticket.
#[must_use]
pub(crate) fn generate_ws_ticket() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// User row returned from session validation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
}

/// Upsert an externally identified user and open a session for them.
/// Returns the session token.
///
/// # Errors
///
/// Returns a database error if the writes fail.
pub async fn open_session(pool: &PgPool, user_id: Uuid, name: &str) -> Result<String, sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, name) VALUES ($1, $2) \
         ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
    )
    .bind(user_id)
    .bind(name)
    .execute(pool)
    .await?;

    let token = generate_token();
    sqlx::query("INSERT INTO sessions (token, user_id) VALUES ($1, $2)")
        .bind(&token)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(token)
}

/// Validate a session token and return the associated user.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<SessionUser>, sqlx::Error> {
    let row = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT u.id, u.name FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id, name)| SessionUser { id, name }))
}

/// Delete a session token (logout).
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn close_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Issue a one-time websocket ticket for an authenticated user.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn issue_ws_ticket(pool: &PgPool, user_id: Uuid) -> Result<String, sqlx::Error> {
    let ticket = generate_ws_ticket();
    sqlx::query("INSERT INTO ws_tickets (ticket, user_id) VALUES ($1, $2)")
        .bind(&ticket)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(ticket)
}

/// Consume a websocket ticket, returning its user. Single use: the ticket
/// row is deleted atomically with the lookup. Tickets older than 60 seconds
/// are rejected.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn consume_ws_ticket(pool: &PgPool, ticket: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let row = sqlx::query_as::<_, (Uuid,)>(
        "DELETE FROM ws_tickets \
         WHERE ticket = $1 AND created_at > now() - interval '60 seconds' \
         RETURNING user_id",
    )
    .bind(ticket)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(user_id,)| user_id))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
