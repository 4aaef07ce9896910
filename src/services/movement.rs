//! Movement batch store — ingest and feed for co-movement batches.
//!
//! DESIGN
//! ======
//! A batch of simultaneous position updates is committed as one logical unit:
//! every node in the batch gets its own record keyed by (frame, render id),
//! and every record stores the entire batch with the same timestamp. Writing
//! a new batch for a node overwrites its prior record — the store keeps no
//! history, only the latest batch per node. Last write wins at node
//! granularity.
//!
//! The returned batch identifier is the last-written record's id joined with
//! the batch timestamp, which equals that record's feed identity. A sender
//! matches it against the newest feed record to recognize its own echo; for
//! multi-node batches the other records' identities differ, and a re-applied
//! echo is harmless because the positions are identical.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::state::AppState;
use crate::wire::{BatchEntry, BatchShapeError, MovementRecord, validate_batch};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MovementError {
    #[error("frame not loaded: {0}")]
    FrameNotLoaded(Uuid),
    #[error("invalid batch: {0}")]
    InvalidBatch(#[from] BatchShapeError),
}

/// Current time as milliseconds since Unix epoch.
pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// INGEST
// =============================================================================

/// Commit a batch of position updates against a frame.
///
/// Upserts one movement record per entry (all carrying the whole batch and
/// one shared timestamp), applies each position to the placement store, and
/// returns the batch identifier.
///
/// # Errors
///
/// Returns `InvalidBatch` on shape violations and `FrameNotLoaded` if the
/// frame isn't in memory.
pub async fn ingest_batch(state: &AppState, frame_id: Uuid, batch: Vec<BatchEntry>) -> Result<String, MovementError> {
    validate_batch(&batch)?;

    let mut frames = state.frames.write().await;
    let frame = frames
        .get_mut(&frame_id)
        .ok_or(MovementError::FrameNotLoaded(frame_id))?;

    let batch_ts = now_ms();
    let mut last_record_id = None;

    for entry in &batch {
        // Keep the placement store converged so a fresh client seeding its
        // node map from CRUD sees the same positions as the feed.
        if let Some(node) = frame.placements.get_mut(&entry.render_id) {
            node.x = entry.position.x;
            node.y = entry.position.y;
            frame.dirty_placements.insert(entry.render_id.clone());
        }

        let record = frame
            .movements
            .entry(entry.render_id.clone())
            .and_modify(|r| {
                r.batch = batch.clone();
                r.batch_ts = batch_ts;
            })
            .or_insert_with(|| MovementRecord {
                record_id: Uuid::new_v4(),
                render_id: entry.render_id.clone(),
                batch: batch.clone(),
                batch_ts,
            });

        last_record_id = Some(record.record_id);
        frame.dirty_movements.insert(entry.render_id.clone());
    }

    // validate_batch rejects empty input, so the loop ran at least once.
    let Some(last_record_id) = last_record_id else {
        return Err(MovementError::InvalidBatch(BatchShapeError::Empty));
    };

    tracing::info!(%frame_id, entries = batch.len(), batch_ts, "movement batch committed");
    Ok(format!("{last_record_id}-{batch_ts}"))
}

// =============================================================================
// FEED
// =============================================================================

/// All movement records for a frame, ascending by batch timestamp.
///
/// No pagination: the corpus compacts to one record per node, so it is
/// naturally bounded by the frame's node count.
///
/// # Errors
///
/// Returns `FrameNotLoaded` if the frame isn't in memory.
pub async fn movement_feed(state: &AppState, frame_id: Uuid) -> Result<Vec<MovementRecord>, MovementError> {
    let frames = state.frames.read().await;
    let frame = frames
        .get(&frame_id)
        .ok_or(MovementError::FrameNotLoaded(frame_id))?;

    let mut records: Vec<MovementRecord> = frame.movements.values().cloned().collect();
    records.sort_by_key(|r| (r.batch_ts, r.record_id));
    Ok(records)
}

#[cfg(test)]
#[path = "movement_test.rs"]
mod tests;
