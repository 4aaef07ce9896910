//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the REST API and the feed WebSocket under a single Axum
//! router. Handlers translate HTTP to service calls; all business logic
//! lives in `services`.

pub mod frames;
pub mod movements;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/channels", post(frames::create_channel))
        .route(
            "/api/channels/{id}/frames",
            get(frames::list_frames).post(frames::create_frame),
        )
        .route(
            "/api/frames/{id}",
            get(frames::get_frame)
                .patch(frames::rename_frame)
                .delete(frames::delete_frame),
        )
        .route(
            "/api/frames/{id}/nodes",
            get(frames::list_nodes).post(frames::place_node),
        )
        .route("/api/frames/{id}/nodes/{render_id}", delete(frames::remove_node))
        .route(
            "/api/frames/{id}/nodes/{render_id}/position",
            patch(movements::update_position),
        )
        .route(
            "/api/frames/{id}/movements",
            get(movements::movement_feed).post(movements::ingest_batch),
        )
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
