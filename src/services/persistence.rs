//! Persistence service — background flush for dirty placements and
//! movement records.
//!
//! DESIGN
//! ======
//! A background task snapshots dirty rows under the state lock, writes them
//! to Postgres lock-free, then sleeps before the next cycle. Movement
//! ingestion and position updates therefore never block on database I/O.
//!
//! ERROR HANDLING
//! ==============
//! Dirty flags are cleared only after successful writes, and only for rows
//! whose in-memory state did not move again during the write. This
//! prioritizes durability over duplicate flush attempts: repeated upserts
//! are acceptable, silent data loss is not.

use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::state::{AppState, CanvasNode};
use crate::wire::MovementRecord;

const DEFAULT_FLUSH_INTERVAL_MS: u64 = 250;

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Spawn the background persistence task. Returns a handle for shutdown.
pub fn spawn_persistence_task(state: AppState) -> JoinHandle<()> {
    let flush_interval_ms = env_parse("FLUSH_INTERVAL_MS", DEFAULT_FLUSH_INTERVAL_MS);
    info!(flush_interval_ms, "persistence flush configured");
    tokio::spawn(async move {
        loop {
            flush_all_dirty(&state).await;
            tokio::time::sleep(Duration::from_millis(flush_interval_ms)).await;
        }
    })
}

// =============================================================================
// DIRTY FLUSH
// =============================================================================

#[derive(Debug)]
struct DirtyFlushBatch {
    frame_id: Uuid,
    placements: Vec<CanvasNode>,
    movements: Vec<MovementRecord>,
    /// Positions at snapshot time, for ack-or-retain on clear.
    flushed_placements: Vec<(String, f64, f64)>,
    /// Timestamps at snapshot time, for ack-or-retain on clear.
    flushed_movements: Vec<(String, i64)>,
}

async fn flush_all_dirty(state: &AppState) {
    // PHASE: SNAPSHOT DIRTY ROWS
    // WHY: collect immutable clones under lock, then perform I/O lock-free.
    let batches = {
        let frames = state.frames.read().await;
        let mut collected = Vec::new();

        for (frame_id, frame_state) in frames.iter() {
            if frame_state.dirty_placements.is_empty() && frame_state.dirty_movements.is_empty() {
                continue;
            }

            let placements = frame_state
                .dirty_placements
                .iter()
                .filter_map(|id| frame_state.placements.get(id).cloned())
                .collect::<Vec<_>>();
            let movements = frame_state
                .dirty_movements
                .iter()
                .filter_map(|id| frame_state.movements.get(id).cloned())
                .collect::<Vec<_>>();

            let flushed_placements = placements
                .iter()
                .map(|node| (node.render_id.clone(), node.x, node.y))
                .collect::<Vec<_>>();
            let flushed_movements = movements
                .iter()
                .map(|record| (record.render_id.clone(), record.batch_ts))
                .collect::<Vec<_>>();

            collected.push(DirtyFlushBatch {
                frame_id: *frame_id,
                placements,
                movements,
                flushed_placements,
                flushed_movements,
            });
        }

        collected
    };

    // PHASE: FLUSH PER FRAME + ACK DIRTY IDS
    // WHY: if a flush fails we intentionally keep dirty flags for retry.
    for batch in batches {
        let result = flush_batch(&state.pool, &batch).await;

        match result {
            Ok(()) => {
                clear_flushed_dirty(state, batch.frame_id, &batch.flushed_placements, &batch.flushed_movements).await;
            }
            Err(e) => {
                error!(
                    error = %e,
                    frame_id = %batch.frame_id,
                    placements = batch.placements.len(),
                    movements = batch.movements.len(),
                    "persistence flush failed"
                );
            }
        }
    }
}

async fn flush_batch(pool: &PgPool, batch: &DirtyFlushBatch) -> Result<(), sqlx::Error> {
    flush_placements(pool, &batch.placements).await?;
    flush_movement_records(pool, batch.frame_id, &batch.movements).await
}

async fn clear_flushed_dirty(
    state: &AppState,
    frame_id: Uuid,
    flushed_placements: &[(String, f64, f64)],
    flushed_movements: &[(String, i64)],
) {
    let mut frames = state.frames.write().await;
    let Some(frame_state) = frames.get_mut(&frame_id) else {
        return;
    };

    for (render_id, x, y) in flushed_placements {
        // EDGE: keep dirty flag if the node moved again after the snapshot.
        let can_clear = match frame_state.placements.get(render_id) {
            Some(current) => current.x == *x && current.y == *y,
            None => true,
        };
        if can_clear {
            frame_state.dirty_placements.remove(render_id);
        }
    }

    for (render_id, batch_ts) in flushed_movements {
        let can_clear = match frame_state.movements.get(render_id) {
            Some(current) => current.batch_ts == *batch_ts,
            None => true,
        };
        if can_clear {
            frame_state.dirty_movements.remove(render_id);
        }
    }
}

#[cfg(test)]
pub(crate) async fn flush_all_dirty_for_tests(state: &AppState) {
    flush_all_dirty(state).await;
}

// =============================================================================
// WRITERS
// =============================================================================

/// Batch upsert placements to Postgres.
///
/// # Errors
///
/// Returns a database error if any upsert fails.
pub async fn flush_placements(pool: &PgPool, nodes: &[CanvasNode]) -> Result<(), sqlx::Error> {
    for node in nodes {
        sqlx::query(
            "INSERT INTO canvas_nodes (id, frame_id, render_id, domain_ref, kind, x, y)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (frame_id, render_id) DO UPDATE SET
                 domain_ref = EXCLUDED.domain_ref, kind = EXCLUDED.kind,
                 x = EXCLUDED.x, y = EXCLUDED.y",
        )
        .bind(node.id)
        .bind(node.frame_id)
        .bind(&node.render_id)
        .bind(node.domain_ref)
        .bind(&node.kind)
        .bind(node.x)
        .bind(node.y)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Batch upsert movement records to Postgres. The row id is stable across
/// overwrites of the same (frame, render id) pair.
///
/// # Errors
///
/// Returns a database error if any upsert fails.
pub async fn flush_movement_records(
    pool: &PgPool,
    frame_id: Uuid,
    records: &[MovementRecord],
) -> Result<(), sqlx::Error> {
    for record in records {
        let batch = serde_json::to_value(&record.batch).unwrap_or_default();
        sqlx::query(
            "INSERT INTO movement_records (id, frame_id, render_id, batch, batch_ts)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (frame_id, render_id) DO UPDATE SET
                 batch = EXCLUDED.batch, batch_ts = EXCLUDED.batch_ts",
        )
        .bind(record.record_id)
        .bind(frame_id)
        .bind(&record.render_id)
        .bind(&batch)
        .bind(record.batch_ts)
        .execute(pool)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
