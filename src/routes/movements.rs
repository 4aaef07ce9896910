//! Movement routes — batch ingest, feed query, single-node position.
//!
//! DESIGN
//! ======
//! The three core operations of the position sync protocol. Every handler
//! consults the access-control collaborator before touching state, then
//! hydrates the frame and delegates to the movement/placement services.
//! Batch ingest additionally fans the refreshed record set out to all feed
//! subscribers — the writer included, since echo suppression is client-side.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::AccessError;
use crate::services::{frame, movement, placement, presence};
use crate::state::AppState;
use crate::wire::{BatchEntry, MovementRecord, Position};

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Extract a bearer token from the Authorization header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

pub(crate) fn access_error_to_status(err: AccessError) -> StatusCode {
    match err {
        AccessError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AccessError::FrameNotFound(_) => StatusCode::NOT_FOUND,
        AccessError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn frame_error_to_status(err: frame::FrameError) -> StatusCode {
    match err {
        frame::FrameError::NotFound(_) | frame::FrameError::ChannelNotFound(_) => StatusCode::NOT_FOUND,
        frame::FrameError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn movement_error_to_status(err: movement::MovementError) -> StatusCode {
    match err {
        movement::MovementError::FrameNotLoaded(_) => StatusCode::NOT_FOUND,
        movement::MovementError::InvalidBatch(_) => StatusCode::BAD_REQUEST,
    }
}

pub(crate) fn placement_error_to_status(err: placement::PlacementError) -> StatusCode {
    match err {
        placement::PlacementError::FrameNotLoaded(_) | placement::PlacementError::NotFound(_) => StatusCode::NOT_FOUND,
        placement::PlacementError::DuplicateRenderId(_) => StatusCode::CONFLICT,
        placement::PlacementError::InvalidShape(_) => StatusCode::BAD_REQUEST,
        placement::PlacementError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// BATCH INGEST
// =============================================================================

#[derive(Deserialize)]
pub struct IngestBody {
    pub batch: Vec<BatchEntry>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub batch_id: String,
}

/// `POST /api/frames/:id/movements` — commit a movement batch.
pub async fn ingest_batch(
    State(state): State<AppState>,
    Path(frame_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<IngestBody>,
) -> Result<Json<IngestResponse>, StatusCode> {
    state
        .access
        .require_frame_access(frame_id, bearer_token(&headers))
        .await
        .map_err(access_error_to_status)?;
    frame::ensure_loaded(&state, frame_id)
        .await
        .map_err(frame_error_to_status)?;

    let batch_id = movement::ingest_batch(&state, frame_id, body.batch)
        .await
        .map_err(movement_error_to_status)?;

    presence::broadcast_movements(&state, frame_id).await;

    Ok(Json(IngestResponse { batch_id }))
}

// =============================================================================
// FEED
// =============================================================================

/// `GET /api/frames/:id/movements` — full record set, ascending by
/// batch timestamp.
pub async fn movement_feed(
    State(state): State<AppState>,
    Path(frame_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<MovementRecord>>, StatusCode> {
    state
        .access
        .require_frame_access(frame_id, bearer_token(&headers))
        .await
        .map_err(access_error_to_status)?;
    frame::ensure_loaded(&state, frame_id)
        .await
        .map_err(frame_error_to_status)?;

    let records = movement::movement_feed(&state, frame_id)
        .await
        .map_err(movement_error_to_status)?;
    Ok(Json(records))
}

// =============================================================================
// SINGLE-NODE POSITION
// =============================================================================

#[derive(Deserialize)]
pub struct UpdatePositionBody {
    pub position: Position,
}

#[derive(Serialize)]
pub struct UpdatePositionResponse {
    /// Placement row id, or null if the node was concurrently removed.
    pub record_id: Option<Uuid>,
}

/// `PATCH /api/frames/:id/nodes/:render_id/position` — solo-mode direct
/// write, bypassing the batch store. A missing node is a silent no-op.
pub async fn update_position(
    State(state): State<AppState>,
    Path((frame_id, render_id)): Path<(Uuid, String)>,
    headers: HeaderMap,
    Json(body): Json<UpdatePositionBody>,
) -> Result<Json<UpdatePositionResponse>, StatusCode> {
    state
        .access
        .require_frame_access(frame_id, bearer_token(&headers))
        .await
        .map_err(access_error_to_status)?;
    frame::ensure_loaded(&state, frame_id)
        .await
        .map_err(frame_error_to_status)?;

    let record_id = placement::update_position(&state, frame_id, &render_id, body.position)
        .await
        .map_err(placement_error_to_status)?;
    Ok(Json(UpdatePositionResponse { record_id }))
}

#[cfg(test)]
#[path = "movements_test.rs"]
mod tests;
