//! Channel, frame, and placement CRUD routes.
//!
//! DESIGN
//! ======
//! Conventional data-access surface around the movement engine: channels own
//! frames, frames own placements. The placement list is what a client seeds
//! its node map from before subscribing to the feed.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::generate_access_token;
use crate::routes::movements::{access_error_to_status, bearer_token, frame_error_to_status, placement_error_to_status};
use crate::services::{frame, placement};
use crate::state::{AppState, CanvasNode};
use crate::wire::Position;

// =============================================================================
// CHANNELS
// =============================================================================

#[derive(Deserialize)]
pub struct CreateChannelBody {
    pub title: String,
    /// When true, a fresh access token gates every frame in the channel.
    #[serde(default)]
    pub secured: bool,
}

#[derive(Serialize)]
pub struct CreateChannelResponse {
    pub id: Uuid,
    pub title: String,
    /// Returned exactly once; only the hash is stored.
    pub access_token: Option<String>,
}

/// `POST /api/channels` — create a channel.
pub async fn create_channel(
    State(state): State<AppState>,
    Json(body): Json<CreateChannelBody>,
) -> Result<(StatusCode, Json<CreateChannelResponse>), StatusCode> {
    let access_token = body.secured.then(generate_access_token);
    let row = frame::create_channel(&state.pool, &body.title, access_token.as_deref())
        .await
        .map_err(frame_error_to_status)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateChannelResponse { id: row.id, title: row.title, access_token }),
    ))
}

// =============================================================================
// FRAMES
// =============================================================================

#[derive(Deserialize)]
pub struct CreateFrameBody {
    pub title: Option<String>,
}

/// `POST /api/channels/:id/frames` — create a frame with the next sort order.
pub async fn create_frame(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Json(body): Json<CreateFrameBody>,
) -> Result<(StatusCode, Json<frame::FrameRow>), StatusCode> {
    let title = body.title.as_deref().unwrap_or("Untitled Frame");
    let row = frame::create_frame(&state.pool, channel_id, title)
        .await
        .map_err(frame_error_to_status)?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// `GET /api/channels/:id/frames` — list a channel's frames in sort order.
pub async fn list_frames(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
) -> Result<Json<Vec<frame::FrameRow>>, StatusCode> {
    let rows = frame::list_frames(&state.pool, channel_id)
        .await
        .map_err(frame_error_to_status)?;
    Ok(Json(rows))
}

/// `GET /api/frames/:id` — fetch one frame.
pub async fn get_frame(
    State(state): State<AppState>,
    Path(frame_id): Path<Uuid>,
) -> Result<Json<frame::FrameRow>, StatusCode> {
    let row = frame::get_frame(&state.pool, frame_id)
        .await
        .map_err(frame_error_to_status)?;
    Ok(Json(row))
}

#[derive(Deserialize)]
pub struct RenameFrameBody {
    pub title: String,
}

/// `PATCH /api/frames/:id` — rename a frame.
pub async fn rename_frame(
    State(state): State<AppState>,
    Path(frame_id): Path<Uuid>,
    Json(body): Json<RenameFrameBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    frame::rename_frame(&state.pool, frame_id, &body.title)
        .await
        .map_err(frame_error_to_status)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `DELETE /api/frames/:id` — delete a frame; placements and movement
/// records cascade with it.
pub async fn delete_frame(
    State(state): State<AppState>,
    Path(frame_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    frame::delete_frame(&state, frame_id)
        .await
        .map_err(frame_error_to_status)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// =============================================================================
// PLACEMENTS
// =============================================================================

#[derive(Deserialize)]
pub struct PlaceNodeBody {
    pub render_id: String,
    pub domain_ref: Uuid,
    pub kind: Option<String>,
    pub position: Position,
}

/// `POST /api/frames/:id/nodes` — place a node on a frame.
pub async fn place_node(
    State(state): State<AppState>,
    Path(frame_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<PlaceNodeBody>,
) -> Result<(StatusCode, Json<CanvasNode>), StatusCode> {
    state
        .access
        .require_frame_access(frame_id, bearer_token(&headers))
        .await
        .map_err(access_error_to_status)?;
    frame::ensure_loaded(&state, frame_id)
        .await
        .map_err(frame_error_to_status)?;

    let kind = body.kind.as_deref().unwrap_or("text");
    let node = placement::place_node(&state, frame_id, &body.render_id, body.domain_ref, kind, body.position)
        .await
        .map_err(placement_error_to_status)?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// `GET /api/frames/:id/nodes` — list placements, the client's node map seed.
pub async fn list_nodes(
    State(state): State<AppState>,
    Path(frame_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<CanvasNode>>, StatusCode> {
    state
        .access
        .require_frame_access(frame_id, bearer_token(&headers))
        .await
        .map_err(access_error_to_status)?;
    frame::ensure_loaded(&state, frame_id)
        .await
        .map_err(frame_error_to_status)?;

    let nodes = placement::list_nodes(&state, frame_id)
        .await
        .map_err(placement_error_to_status)?;
    Ok(Json(nodes))
}

/// `DELETE /api/frames/:id/nodes/:render_id` — remove a placement.
pub async fn remove_node(
    State(state): State<AppState>,
    Path((frame_id, render_id)): Path<(Uuid, String)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .access
        .require_frame_access(frame_id, bearer_token(&headers))
        .await
        .map_err(access_error_to_status)?;
    frame::ensure_loaded(&state, frame_id)
        .await
        .map_err(frame_error_to_status)?;

    placement::remove_node(&state, frame_id, &render_id)
        .await
        .map_err(placement_error_to_status)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
