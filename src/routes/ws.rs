//! Feed WebSocket — live movement and presence pushes for one frame.
//!
//! DESIGN
//! ======
//! On upgrade the socket subscribes to the frame and enters a `select!`
//! loop: feed events queued by peers (or the subscriber's own writes) are
//! serialized out, inbound text is ignored. There is no inbound protocol —
//! all writes go through the REST API; the socket exists purely so every
//! participant sees each committed batch and each presence change.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → access check → hydrate frame → subscribe
//! 2. Send `connected`, the current record set, and a presence broadcast
//! 3. Pushed events → serialize → socket
//! 4. Close → unsubscribe (final flush + eviction if last) → presence
//!    broadcast to the remaining participants

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::{frame, movement, presence};
use crate::state::AppState;
use crate::wire::FeedEvent;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(frame_id) = params.get("frame_id").and_then(|s| s.parse::<Uuid>().ok()) else {
        return (StatusCode::BAD_REQUEST, "frame_id required").into_response();
    };

    // Credential travels as a query param: headers are awkward to set on
    // browser WebSocket upgrades.
    let token = params.get("token").map(String::as_str);
    if let Err(e) = state.access.require_frame_access(frame_id, token).await {
        warn!(%frame_id, error = %e, "ws: access denied");
        return (super::movements::access_error_to_status(e), "access denied").into_response();
    }

    if let Err(e) = frame::ensure_loaded(&state, frame_id).await {
        return (super::movements::frame_error_to_status(e), "frame not found").into_response();
    }

    ws.on_upgrade(move |socket| run_ws(socket, state, frame_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, frame_id: Uuid) {
    // Per-connection channel for feed events pushed by writers.
    let (tx, mut rx) = mpsc::channel::<FeedEvent>(256);

    let Some(subscription) = presence::subscribe(&state, frame_id, tx).await else {
        return;
    };
    let participant_id = subscription.participant_id;

    let connected = FeedEvent::Connected {
        participant_id,
        color: subscription.color.clone(),
        alone: subscription.alone,
    };
    if send_event(&mut socket, &connected).await.is_err() {
        presence::unsubscribe(&state, frame_id, participant_id).await;
        return;
    }

    // Initial refresh: a subscriber always starts from the full record set.
    if let Ok(records) = movement::movement_feed(&state, frame_id).await {
        let _ = send_event(&mut socket, &FeedEvent::Movements { records }).await;
    }

    // Tell everyone (this subscriber included) that the count changed.
    presence::broadcast_presence(&state, frame_id).await;

    info!(%frame_id, %participant_id, "ws: participant connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Close(_) => break,
                    // No inbound protocol; writes go through the REST API.
                    Message::Text(_) | Message::Binary(_) => {}
                    _ => {}
                }
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    presence::unsubscribe(&state, frame_id, participant_id).await;
    presence::broadcast_presence(&state, frame_id).await;
    info!(%frame_id, %participant_id, "ws: participant disconnected");
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_event(socket: &mut WebSocket, event: &FeedEvent) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize feed event");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}
