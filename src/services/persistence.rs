//! Persistence service — background flush for dirty editor sessions and the
//! frame transcript writer.
//!
//! DESIGN
//! ======
//! A background task persists dirty session documents, then sleeps before
//! the next cycle. Frames use a bounded queue + batched async writer so
//! websocket handling never blocks on Postgres I/O.
//!
//! ERROR HANDLING
//! ==============
//! Dirty flags are cleared only after successful writes, and only when the
//! session's revision is unchanged. This prioritizes durability over
//! duplicate flush attempts: repeated upserts are acceptable, silent data
//! loss is not.

use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::deck::DeckDocument;
use crate::frame::Frame;
use crate::state::AppState;

const DEFAULT_FRAME_PERSIST_QUEUE_CAPACITY: usize = 8192;
const DEFAULT_FRAME_PERSIST_BATCH_SIZE: usize = 128;
const DEFAULT_FRAME_PERSIST_FLUSH_MS: u64 = 5;
const DEFAULT_FRAME_PERSIST_RETRIES: usize = 2;
const DEFAULT_FRAME_PERSIST_RETRY_BASE_MS: u64 = 20;
const DEFAULT_SESSION_FLUSH_INTERVAL_MS: u64 = 500;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Tuning knobs for the frame persistence worker.
#[derive(Clone, Copy)]
struct FramePersistConfig {
    queue_capacity: usize,
    batch_size: usize,
    flush_ms: u64,
    retries: usize,
    retry_base_ms: u64,
}

impl FramePersistConfig {
    fn from_env() -> Self {
        Self {
            queue_capacity: env_parse("FRAME_PERSIST_QUEUE_CAPACITY", DEFAULT_FRAME_PERSIST_QUEUE_CAPACITY),
            batch_size: env_parse("FRAME_PERSIST_BATCH_SIZE", DEFAULT_FRAME_PERSIST_BATCH_SIZE),
            flush_ms: env_parse("FRAME_PERSIST_FLUSH_MS", DEFAULT_FRAME_PERSIST_FLUSH_MS),
            retries: env_parse("FRAME_PERSIST_RETRIES", DEFAULT_FRAME_PERSIST_RETRIES),
            retry_base_ms: env_parse("FRAME_PERSIST_RETRY_BASE_MS", DEFAULT_FRAME_PERSIST_RETRY_BASE_MS),
        }
    }
}

// =============================================================================
// SESSION FLUSH
// =============================================================================

/// Spawn the background session-flush task. Returns a handle for shutdown.
pub fn spawn_session_flush_task(state: AppState) -> JoinHandle<()> {
    let interval_ms = env_parse("SESSION_FLUSH_INTERVAL_MS", DEFAULT_SESSION_FLUSH_INTERVAL_MS);
    info!(interval_ms, "session persistence flush configured");
    tokio::spawn(async move {
        loop {
            flush_all_dirty(&state).await;
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    })
}

#[derive(Debug)]
struct DirtyFlushSnapshot {
    project_id: String,
    document: DeckDocument,
    revision: u64,
}

async fn flush_all_dirty(state: &AppState) {
    // Snapshot dirty sessions under the lock, then write lock-free.
    let snapshots = {
        let sessions = state.sessions.read().await;
        sessions
            .iter()
            .filter(|(_, session)| session.dirty)
            .map(|(project_id, session)| DirtyFlushSnapshot {
                project_id: project_id.clone(),
                document: session.document.clone(),
                revision: session.revision,
            })
            .collect::<Vec<_>>()
    };

    for snapshot in snapshots {
        match super::deck::persist_document(&state.pool, &snapshot.project_id, &snapshot.document).await {
            Ok(()) => {
                let mut sessions = state.sessions.write().await;
                if let Some(session) = sessions.get_mut(&snapshot.project_id) {
                    // EDGE: keep the dirty flag if the document changed again
                    // after the snapshot.
                    if session.revision == snapshot.revision {
                        session.dirty = false;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, project_id = %snapshot.project_id, "session flush failed");
            }
        }
    }
}

#[cfg(test)]
pub(crate) async fn flush_all_dirty_for_tests(state: &AppState) {
    flush_all_dirty(state).await;
}

// =============================================================================
// FRAME PERSISTENCE
// =============================================================================

/// Spawn a bounded frame persistence worker and return its queue sender.
///
/// Frames are written in batches to reduce DB overhead and keep websocket
/// request/response latency predictable.
#[must_use]
pub fn spawn_frame_persistence_worker(pool: PgPool) -> tokio::sync::mpsc::Sender<Frame> {
    let config = FramePersistConfig::from_env();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Frame>(config.queue_capacity);

    info!(
        queue_capacity = config.queue_capacity,
        batch_size = config.batch_size,
        flush_ms = config.flush_ms,
        retries = config.retries,
        retry_base_ms = config.retry_base_ms,
        "frame persistence worker configured"
    );

    tokio::spawn(async move {
        let mut batch: Vec<Frame> = Vec::with_capacity(config.batch_size);
        let mut ticker = tokio::time::interval(Duration::from_millis(config.flush_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_frame = rx.recv() => {
                    if let Some(frame) = maybe_frame {
                        batch.push(frame);
                        if batch.len() >= config.batch_size {
                            flush_frame_batch_with_retry(&pool, &mut batch, config).await;
                        }
                    } else {
                        flush_frame_batch_with_retry(&pool, &mut batch, config).await;
                        break;
                    }
                }
                _ = ticker.tick() => {
                    flush_frame_batch_with_retry(&pool, &mut batch, config).await;
                }
            }
        }
    });

    tx
}

/// Best-effort, non-blocking enqueue for frame persistence. Without a
/// running worker the frame is written directly, fire-and-forget.
pub fn enqueue_frame(state: &AppState, frame: &Frame) {
    let Some(tx) = &state.frame_persist_tx else {
        let pool = state.pool.clone();
        let frame = frame.clone();
        tokio::spawn(async move {
            if let Err(e) = persist_frame(&pool, &frame).await {
                warn!(id = %frame.id, error = %e, "direct frame persist failed");
            }
        });
        return;
    };

    match tx.try_send(frame.clone()) {
        Ok(()) => {}
        Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
            warn!(id = %frame.id, syscall = %frame.syscall, "frame persist queue full; dropping frame");
        }
        Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
            warn!(id = %frame.id, syscall = %frame.syscall, "frame persist queue closed; dropping frame");
        }
    }
}

async fn flush_frame_batch_with_retry(pool: &PgPool, batch: &mut Vec<Frame>, config: FramePersistConfig) {
    if batch.is_empty() {
        return;
    }

    let drained = std::mem::take(batch);
    for attempt in 1..=config.retries {
        match persist_frame_batch(pool, &drained).await {
            Ok(()) => return,
            Err(e) if attempt < config.retries => {
                warn!(
                    error = %e,
                    attempt,
                    total = config.retries,
                    count = drained.len(),
                    "frame batch persist failed; retrying"
                );
                tokio::time::sleep(Duration::from_millis((attempt as u64) * config.retry_base_ms)).await;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    count = drained.len(),
                    "frame batch persist failed after retries; dropping frames"
                );
                return;
            }
        }
    }
}

/// Persist a single frame row.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn persist_frame(pool: &PgPool, frame: &Frame) -> Result<(), sqlx::Error> {
    persist_frame_batch(pool, std::slice::from_ref(frame)).await
}

/// Persist a batch of frames in one transaction.
///
/// # Errors
///
/// Returns a database error if any insert fails.
pub async fn persist_frame_batch(pool: &PgPool, frames: &[Frame]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for frame in frames {
        let status = serde_json::to_value(frame.status)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        let data = serde_json::to_value(&frame.data).unwrap_or_default();

        sqlx::query(
            r#"INSERT INTO frames (id, parent_id, syscall, status, project_id, "from", data, ts)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(frame.id)
        .bind(frame.parent_id)
        .bind(&frame.syscall)
        .bind(&status)
        .bind(&frame.project_id)
        .bind(&frame.from)
        .bind(&data)
        .bind(frame.ts)
        .execute(tx.as_mut())
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
