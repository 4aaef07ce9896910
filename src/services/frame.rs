//! Frame service — channel/frame CRUD and state hydration.
//!
//! DESIGN
//! ======
//! Channels and frames are plain Postgres rows; the interesting state (the
//! placement and movement stores) is hydrated into memory on first touch and
//! kept there while any subscriber is attached or dirty rows remain. Frame
//! deletion cascades to placements and movement records at the database
//! level and evicts the in-memory state.

use std::collections::HashMap;

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::access::hash_token;
use crate::services::movement::now_ms;
use crate::state::{AppState, CanvasNode, FrameState};
use crate::wire::{BatchEntry, MovementRecord};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame not found: {0}")]
    NotFound(Uuid),
    #[error("channel not found: {0}")]
    ChannelNotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Row returned from channel creation.
#[derive(Debug, Clone)]
pub struct ChannelRow {
    pub id: Uuid,
    pub title: String,
}

/// Row returned from frame queries.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FrameRow {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub title: String,
    pub sort_order: i32,
}

// =============================================================================
// CHANNEL CRUD
// =============================================================================

/// Create a channel. When `access_token` is set, its hash gates every frame
/// in the channel; the plaintext token is never stored.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_channel(pool: &PgPool, title: &str, access_token: Option<&str>) -> Result<ChannelRow, FrameError> {
    let id = Uuid::new_v4();
    let token_hash = access_token.map(hash_token);
    sqlx::query("INSERT INTO channels (id, title, access_token_hash) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(title)
        .bind(token_hash)
        .execute(pool)
        .await?;

    Ok(ChannelRow { id, title: title.to_owned() })
}

// =============================================================================
// FRAME CRUD
// =============================================================================

/// Create a frame in a channel with the next sort order.
///
/// # Errors
///
/// Returns `ChannelNotFound` if the channel doesn't exist.
pub async fn create_frame(pool: &PgPool, channel_id: Uuid, title: &str) -> Result<FrameRow, FrameError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM channels WHERE id = $1)")
        .bind(channel_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(FrameError::ChannelNotFound(channel_id));
    }

    let sort_order: i32 = sqlx::query_scalar("SELECT COALESCE(MAX(sort_order), 0) + 1 FROM frames WHERE channel_id = $1")
        .bind(channel_id)
        .fetch_one(pool)
        .await?;

    let id = Uuid::new_v4();
    let now = now_ms();
    sqlx::query(
        "INSERT INTO frames (id, channel_id, title, sort_order, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $5)",
    )
    .bind(id)
    .bind(channel_id)
    .bind(title)
    .bind(sort_order)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(FrameRow { id, channel_id, title: title.to_owned(), sort_order })
}

/// Fetch a frame by ID.
///
/// # Errors
///
/// Returns `NotFound` if the frame doesn't exist.
pub async fn get_frame(pool: &PgPool, frame_id: Uuid) -> Result<FrameRow, FrameError> {
    let row = sqlx::query_as::<_, (Uuid, Uuid, String, i32)>(
        "SELECT id, channel_id, title, sort_order FROM frames WHERE id = $1",
    )
    .bind(frame_id)
    .fetch_optional(pool)
    .await?;

    let Some((id, channel_id, title, sort_order)) = row else {
        return Err(FrameError::NotFound(frame_id));
    };
    Ok(FrameRow { id, channel_id, title, sort_order })
}

/// List a channel's frames in sort order.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_frames(pool: &PgPool, channel_id: Uuid) -> Result<Vec<FrameRow>, FrameError> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, String, i32)>(
        "SELECT id, channel_id, title, sort_order FROM frames WHERE channel_id = $1 ORDER BY sort_order ASC",
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, channel_id, title, sort_order)| FrameRow { id, channel_id, title, sort_order })
        .collect())
}

/// Rename a frame.
///
/// # Errors
///
/// Returns `NotFound` if the frame doesn't exist.
pub async fn rename_frame(pool: &PgPool, frame_id: Uuid, title: &str) -> Result<(), FrameError> {
    let result = sqlx::query("UPDATE frames SET title = $2, updated_at = $3 WHERE id = $1")
        .bind(frame_id)
        .bind(title)
        .bind(now_ms())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(FrameError::NotFound(frame_id));
    }
    Ok(())
}

/// Delete a frame. Cascades to placements and movement records in Postgres
/// and evicts the in-memory state.
///
/// # Errors
///
/// Returns `NotFound` if the frame doesn't exist.
pub async fn delete_frame(state: &AppState, frame_id: Uuid) -> Result<(), FrameError> {
    let result = sqlx::query("DELETE FROM frames WHERE id = $1")
        .bind(frame_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(FrameError::NotFound(frame_id));
    }

    let mut frames = state.frames.write().await;
    if frames.remove(&frame_id).is_some() {
        info!(%frame_id, "evicted deleted frame from memory");
    }
    Ok(())
}

// =============================================================================
// HYDRATION
// =============================================================================

/// Load a frame's placement and movement stores into memory if they aren't
/// resident yet. Every frame-scoped operation goes through here first.
///
/// # Errors
///
/// Returns `NotFound` if the frame doesn't exist in the database.
pub async fn ensure_loaded(state: &AppState, frame_id: Uuid) -> Result<(), FrameError> {
    {
        let frames = state.frames.read().await;
        if frames.contains_key(&frame_id) {
            return Ok(());
        }
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM frames WHERE id = $1)")
        .bind(frame_id)
        .fetch_one(&state.pool)
        .await?;
    if !exists {
        return Err(FrameError::NotFound(frame_id));
    }

    // Fetch snapshots outside the lock; apply only if we won the race.
    let placements = hydrate_placements(&state.pool, frame_id).await?;
    let movements = hydrate_movements(&state.pool, frame_id).await?;

    let mut frames = state.frames.write().await;
    let frame_state = frames.entry(frame_id).or_insert_with(FrameState::new);
    if frame_state.placements.is_empty() && frame_state.movements.is_empty() {
        info!(%frame_id, placements = placements.len(), movements = movements.len(), "hydrated frame from database");
        frame_state.placements = placements;
        frame_state.movements = movements;
    }
    Ok(())
}

async fn hydrate_placements(pool: &PgPool, frame_id: Uuid) -> Result<HashMap<String, CanvasNode>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, String, Uuid, String, f64, f64)>(
        "SELECT id, frame_id, render_id, domain_ref, kind, x, y FROM canvas_nodes WHERE frame_id = $1",
    )
    .bind(frame_id)
    .fetch_all(pool)
    .await?;

    let mut placements = HashMap::new();
    for (id, frame_id, render_id, domain_ref, kind, x, y) in rows {
        placements.insert(
            render_id.clone(),
            CanvasNode { id, frame_id, render_id, domain_ref, kind, x, y },
        );
    }
    Ok(placements)
}

async fn hydrate_movements(pool: &PgPool, frame_id: Uuid) -> Result<HashMap<String, MovementRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, String, serde_json::Value, i64)>(
        "SELECT id, render_id, batch, batch_ts FROM movement_records WHERE frame_id = $1",
    )
    .bind(frame_id)
    .fetch_all(pool)
    .await?;

    let mut movements = HashMap::new();
    for (record_id, render_id, batch, batch_ts) in rows {
        let batch: Vec<BatchEntry> = match serde_json::from_value(batch) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(%record_id, error = %e, "skipping undecodable movement batch");
                continue;
            }
        };
        movements.insert(render_id.clone(), MovementRecord { record_id, render_id, batch, batch_ts });
    }
    Ok(movements)
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
