//! Narration service — TTS generation and the per-deck audio cache.
//!
//! DESIGN
//! ======
//! Generation always re-derives fragments from the current slide content
//! (caller-supplied fragment lists are never trusted), synthesizes them in
//! fixed-size sequential batches under the provider's concurrency cap, and
//! replaces the project's entire cache in one transaction. Regeneration is a
//! full recompute + full replace — no incremental patching, so the cache can
//! never drift from slide content it was generated against.
//!
//! ERROR HANDLING
//! ==============
//! This is the one loud component: any failed fragment fails the whole
//! generation after its batch completes. Partial narration is worse than a
//! clear failure the caller can retry; a previously cached generation stays
//! untouched because nothing is written until every fragment succeeded.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::deck::narration::{extract_fragments, Fragment};
use crate::deck::reveal;
use crate::state::AppState;
use crate::tts::{SpeechSynth, SynthesizedAudio, TtsError};

use super::deck::{self, DeckError};

/// Fragments synthesized in parallel per batch; the provider's concurrent
/// request ceiling.
const DEFAULT_TTS_CONCURRENCY: usize = 4;

fn tts_concurrency() -> usize {
    std::env::var("TTS_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_TTS_CONCURRENCY)
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum NarrationError {
    #[error("TTS not configured")]
    TtsNotConfigured,
    #[error("deck error: {0}")]
    Deck(#[from] DeckError),
    #[error("synthesis failed for slide {slide_index} fragment {fragment_index}: {source}")]
    Synthesis {
        slide_index: usize,
        fragment_index: usize,
        source: TtsError,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::frame::ErrorCode for NarrationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::TtsNotConfigured => "E_TTS_NOT_CONFIGURED",
            Self::Deck(e) => e.error_code(),
            Self::Synthesis { .. } => "E_TTS_SYNTHESIS",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Synthesis { source, .. } if source.retryable())
    }
}

/// One fully synthesized fragment, ready to persist.
#[derive(Debug)]
pub struct ProcessedFragment {
    pub slide_index: usize,
    pub fragment_index: usize,
    pub text: String,
    pub audio: SynthesizedAudio,
    pub duration_ms: u64,
}

/// Totals reported back to the caller after a successful generation.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct NarrationSummary {
    pub slides: usize,
    pub fragments: usize,
}

/// One persisted cache row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CachedFragmentRow {
    pub slide_index: usize,
    pub fragment_index: usize,
    pub tts_text: String,
    pub audio_id: Uuid,
    pub duration_ms: u64,
}

// =============================================================================
// GENERATION
// =============================================================================

/// Regenerate the narration cache for a deck.
///
/// # Errors
///
/// Fails loudly on the first failed batch; the prior cache is left intact
/// in that case.
pub async fn generate_narration(state: &AppState, project_id: &str) -> Result<NarrationSummary, NarrationError> {
    let Some(synth) = &state.tts else {
        return Err(NarrationError::TtsNotConfigured);
    };

    let record = deck::get_deck(&state.pool, project_id).await?;
    let document = record.document.unwrap_or_default();
    let slides = reveal::extract_reveal_slides(&document);

    let mut fragments: Vec<Fragment> = Vec::new();
    for (index, slide) in slides.iter().enumerate() {
        let (_, slide_fragments) = extract_fragments(&slide.html, index);
        fragments.extend(slide_fragments);
    }

    info!(%project_id, slides = slides.len(), fragments = fragments.len(), "narration: generation started");

    let processed = synthesize_fragments(synth, fragments, tts_concurrency()).await?;
    let summary = NarrationSummary { slides: slides.len(), fragments: processed.len() };

    persist_narration(&state.pool, project_id, &processed).await?;

    info!(%project_id, fragments = summary.fragments, "narration: cache replaced");
    Ok(summary)
}

/// Synthesize all fragments in sequential batches of `batch_size`.
///
/// Within a batch every request runs in parallel and all are awaited before
/// the next batch starts — the sole backpressure mechanism in the pipeline.
///
/// # Errors
///
/// The first failed fragment fails the whole run once its batch completes.
pub(crate) async fn synthesize_fragments(
    synth: &Arc<dyn SpeechSynth>,
    fragments: Vec<Fragment>,
    batch_size: usize,
) -> Result<Vec<ProcessedFragment>, NarrationError> {
    let mut processed = Vec::with_capacity(fragments.len());

    for batch in fragments.chunks(batch_size.max(1)) {
        let results = futures::future::join_all(batch.iter().map(|fragment| synth.synthesize(&fragment.text))).await;

        for (fragment, result) in batch.iter().zip(results) {
            let audio = result.map_err(|source| NarrationError::Synthesis {
                slide_index: fragment.slide_index,
                fragment_index: fragment.fragment_index,
                source,
            })?;
            let duration_ms = audio.duration_ms();
            processed.push(ProcessedFragment {
                slide_index: fragment.slide_index,
                fragment_index: fragment.fragment_index,
                text: fragment.text.clone(),
                audio,
                duration_ms,
            });
        }
    }

    Ok(processed)
}

// =============================================================================
// CACHE PERSISTENCE
// =============================================================================

/// Replace the project's entire narration cache in one transaction.
async fn persist_narration(
    pool: &PgPool,
    project_id: &str,
    processed: &[ProcessedFragment],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM narration_fragments WHERE project_id = $1")
        .bind(project_id)
        .execute(tx.as_mut())
        .await?;
    sqlx::query("DELETE FROM narration_audio WHERE project_id = $1")
        .bind(project_id)
        .execute(tx.as_mut())
        .await?;

    for fragment in processed {
        let audio_id = Uuid::new_v4();
        sqlx::query("INSERT INTO narration_audio (id, project_id, content_type, bytes) VALUES ($1, $2, $3, $4)")
            .bind(audio_id)
            .bind(project_id)
            .bind(&fragment.audio.content_type)
            .bind(&fragment.audio.bytes)
            .execute(tx.as_mut())
            .await?;

        sqlx::query(
            "INSERT INTO narration_fragments (project_id, slide_index, fragment_index, tts_text, audio_id, duration_ms) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(project_id)
        .bind(i32::try_from(fragment.slide_index).unwrap_or(i32::MAX))
        .bind(i32::try_from(fragment.fragment_index).unwrap_or(i32::MAX))
        .bind(&fragment.text)
        .bind(audio_id)
        .bind(i64::try_from(fragment.duration_ms).unwrap_or(i64::MAX))
        .execute(tx.as_mut())
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

// =============================================================================
// CACHE READS
// =============================================================================

/// Load a project's cached fragments, ordered by slide then fragment index.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn load_narration(pool: &PgPool, project_id: &str) -> Result<Vec<CachedFragmentRow>, NarrationError> {
    let rows = sqlx::query_as::<_, (i32, i32, String, Uuid, i64)>(
        "SELECT slide_index, fragment_index, tts_text, audio_id, duration_ms \
         FROM narration_fragments WHERE project_id = $1 \
         ORDER BY slide_index ASC, fragment_index ASC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(slide_index, fragment_index, tts_text, audio_id, duration_ms)| CachedFragmentRow {
            slide_index: usize::try_from(slide_index).unwrap_or_default(),
            fragment_index: usize::try_from(fragment_index).unwrap_or_default(),
            tts_text,
            audio_id,
            duration_ms: u64::try_from(duration_ms).unwrap_or_default(),
        })
        .collect())
}

/// Group cached rows by slide index, preserving fragment order.
#[must_use]
pub fn group_by_slide(rows: Vec<CachedFragmentRow>) -> HashMap<usize, Vec<CachedFragmentRow>> {
    let mut grouped: HashMap<usize, Vec<CachedFragmentRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.slide_index).or_default().push(row);
    }
    grouped
}

/// Fetch one cached audio blob.
///
/// # Errors
///
/// Returns a database error if the query fails; a missing blob is `None`.
pub async fn get_audio(
    pool: &PgPool,
    project_id: &str,
    audio_id: Uuid,
) -> Result<Option<(String, Vec<u8>)>, NarrationError> {
    let row = sqlx::query_as::<_, (String, Vec<u8>)>(
        "SELECT content_type, bytes FROM narration_audio WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(audio_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
#[path = "narration_test.rs"]
mod tests;
