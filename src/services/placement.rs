//! Placement service — node placements on frames.
//!
//! DESIGN
//! ======
//! Placement mutations update in-memory state immediately and mark the row
//! dirty for debounced persistence. The single-node position path exists for
//! the solo editing mode: it writes the placement directly, bypassing the
//! movement batch store entirely.
//!
//! ERROR HANDLING
//! ==============
//! A position update for a render id that no longer exists is a benign no-op
//! (`Ok(None)`), never an error: node removal racing a trailing debounced
//! write is a legitimate concurrent outcome.

use uuid::Uuid;

use crate::state::{AppState, CanvasNode};
use crate::wire::{BatchShapeError, Position, position_is_finite};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("frame not loaded: {0}")]
    FrameNotLoaded(Uuid),
    #[error("render id already placed on frame: {0}")]
    DuplicateRenderId(String),
    #[error("placement not found: {0}")]
    NotFound(String),
    #[error("invalid placement: {0}")]
    InvalidShape(#[from] BatchShapeError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// PLACE
// =============================================================================

/// Place a node on a frame.
///
/// # Errors
///
/// Returns `DuplicateRenderId` if the render id is already placed and
/// `FrameNotLoaded` if the frame isn't in memory.
pub async fn place_node(
    state: &AppState,
    frame_id: Uuid,
    render_id: &str,
    domain_ref: Uuid,
    kind: &str,
    position: Position,
) -> Result<CanvasNode, PlacementError> {
    if render_id.trim().is_empty() {
        return Err(PlacementError::InvalidShape(BatchShapeError::BlankRenderId { index: 0 }));
    }
    if !position_is_finite(position) {
        return Err(PlacementError::InvalidShape(BatchShapeError::NonFiniteCoordinate {
            render_id: render_id.to_owned(),
        }));
    }

    let mut frames = state.frames.write().await;
    let frame = frames
        .get_mut(&frame_id)
        .ok_or(PlacementError::FrameNotLoaded(frame_id))?;

    if frame.placements.contains_key(render_id) {
        return Err(PlacementError::DuplicateRenderId(render_id.to_owned()));
    }

    let node = CanvasNode {
        id: Uuid::new_v4(),
        frame_id,
        render_id: render_id.to_owned(),
        domain_ref,
        kind: kind.to_owned(),
        x: position.x,
        y: position.y,
    };

    let result = node.clone();
    frame.dirty_placements.insert(node.render_id.clone());
    frame.placements.insert(node.render_id.clone(), node);

    Ok(result)
}

// =============================================================================
// SINGLE-NODE POSITION
// =============================================================================

/// Update one node's position directly, bypassing the batch store.
///
/// Used when a frame has exactly one active editor. Returns the placement
/// row id, or `None` if the node was concurrently removed — silently, so a
/// trailing debounced write after a removal never surfaces as an error.
///
/// # Errors
///
/// Returns `FrameNotLoaded` if the frame isn't in memory.
pub async fn update_position(
    state: &AppState,
    frame_id: Uuid,
    render_id: &str,
    position: Position,
) -> Result<Option<Uuid>, PlacementError> {
    if !position_is_finite(position) {
        return Err(PlacementError::InvalidShape(BatchShapeError::NonFiniteCoordinate {
            render_id: render_id.to_owned(),
        }));
    }

    let mut frames = state.frames.write().await;
    let frame = frames
        .get_mut(&frame_id)
        .ok_or(PlacementError::FrameNotLoaded(frame_id))?;

    let Some(node) = frame.placements.get_mut(render_id) else {
        tracing::debug!(%frame_id, render_id, "position update for absent node ignored");
        return Ok(None);
    };

    node.x = position.x;
    node.y = position.y;
    frame.dirty_placements.insert(render_id.to_owned());

    Ok(Some(node.id))
}

// =============================================================================
// LIST / REMOVE
// =============================================================================

/// List all placements on a frame, the seed for a client's node map.
///
/// # Errors
///
/// Returns `FrameNotLoaded` if the frame isn't in memory.
pub async fn list_nodes(state: &AppState, frame_id: Uuid) -> Result<Vec<CanvasNode>, PlacementError> {
    let frames = state.frames.read().await;
    let frame = frames
        .get(&frame_id)
        .ok_or(PlacementError::FrameNotLoaded(frame_id))?;

    let mut nodes: Vec<CanvasNode> = frame.placements.values().cloned().collect();
    nodes.sort_by(|a, b| a.render_id.cmp(&b.render_id));
    Ok(nodes)
}

/// Remove a placement from a frame. Removes from memory and Postgres
/// immediately. The node's movement record is left in place — replay on
/// other clients skips render ids they no longer know.
///
/// # Errors
///
/// Returns `NotFound` if the placement doesn't exist.
pub async fn remove_node(state: &AppState, frame_id: Uuid, render_id: &str) -> Result<(), PlacementError> {
    {
        let mut frames = state.frames.write().await;
        let frame = frames
            .get_mut(&frame_id)
            .ok_or(PlacementError::FrameNotLoaded(frame_id))?;

        if frame.placements.remove(render_id).is_none() {
            return Err(PlacementError::NotFound(render_id.to_owned()));
        }
        frame.dirty_placements.remove(render_id);
    }

    // Delete from Postgres immediately (not deferred).
    sqlx::query("DELETE FROM canvas_nodes WHERE frame_id = $1 AND render_id = $2")
        .bind(frame_id)
        .bind(render_id)
        .execute(&state.pool)
        .await?;

    Ok(())
}

#[cfg(test)]
#[path = "placement_test.rs"]
mod tests;
