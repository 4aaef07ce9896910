//! Presence service — feed subscribers, mode signals, and fan-out.
//!
//! DESIGN
//! ======
//! Every open frame socket registers a subscriber here. Presence counts
//! drive the client's mode selection: a participant is "alone" exactly when
//! it is the only live subscriber, and every join/part re-broadcasts the
//! count so clients can switch between debounced solo writes and batched
//! collaborative sync.
//!
//! Movement pushes go to every subscriber including the writer. That echo is
//! intentional: suppression is the sending client's job, and delivering the
//! full record set to everyone keeps late or lossy clients self-correcting.
//!
//! ERROR HANDLING
//! ==============
//! On last-subscriber part, dirty rows are flushed before eviction. If that
//! flush fails, the frame is intentionally kept in memory with dirty flags
//! intact so the persistence task can retry instead of losing edits.

use rand::Rng;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::services::{movement, persistence};
use crate::state::{AppState, Participant};
use crate::wire::FeedEvent;

/// Presence colors assigned to subscribers, round-robin by random pick.
pub const PRESENCE_PALETTE: [&str; 8] = [
    "#E57373", "#64B5F6", "#81C784", "#FFD54F", "#BA68C8", "#4DB6AC", "#F06292", "#A1887F",
];

/// Result of a successful feed subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub participant_id: Uuid,
    pub color: String,
    /// True when this subscriber is the only one on the frame.
    pub alone: bool,
}

fn pick_color() -> String {
    let index = rand::rng().random_range(0..PRESENCE_PALETTE.len());
    PRESENCE_PALETTE[index].to_owned()
}

// =============================================================================
// SUBSCRIBE / UNSUBSCRIBE
// =============================================================================

/// Register a feed subscriber for a frame. The frame must already be loaded.
pub async fn subscribe(state: &AppState, frame_id: Uuid, tx: mpsc::Sender<FeedEvent>) -> Option<Subscription> {
    let mut frames = state.frames.write().await;
    let frame_state = frames.get_mut(&frame_id)?;

    let participant_id = Uuid::new_v4();
    let color = pick_color();
    frame_state.subscribers.insert(participant_id, tx);
    frame_state
        .participants
        .insert(participant_id, Participant { color: color.clone() });

    let alone = frame_state.subscribers.len() <= 1;
    info!(%frame_id, %participant_id, subscribers = frame_state.subscribers.len(), "participant subscribed");

    Some(Subscription { participant_id, color, alone })
}

/// Drop a feed subscriber. If it was the last one, flushes dirty rows and
/// evicts the frame state from memory.
pub async fn unsubscribe(state: &AppState, frame_id: Uuid, participant_id: Uuid) {
    let mut frames = state.frames.write().await;
    let Some(frame_state) = frames.get_mut(&frame_id) else {
        return;
    };

    frame_state.subscribers.remove(&participant_id);
    frame_state.participants.remove(&participant_id);
    info!(%frame_id, %participant_id, remaining = frame_state.subscribers.len(), "participant unsubscribed");

    if !frame_state.subscribers.is_empty() {
        return;
    }

    // PHASE: HANDLE CLEAN EVICTION FAST PATH
    // WHY: avoid unnecessary I/O when the frame has no pending mutations.
    if frame_state.dirty_placements.is_empty() && frame_state.dirty_movements.is_empty() {
        frames.remove(&frame_id);
        info!(%frame_id, "evicted frame from memory");
        return;
    }

    // PHASE: SNAPSHOT DIRTY ROWS FOR FINAL FLUSH
    // WHY: perform DB I/O outside the lock and keep dirty flags until the
    // write has actually succeeded.
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

    // Release lock before writing to Postgres.
    drop(frames);
    let flush_result = async {
        persistence::flush_placements(&state.pool, &placements).await?;
        persistence::flush_movement_records(&state.pool, frame_id, &movements).await
    }
    .await;

    // PHASE: ACK OR RETAIN DIRTY FLAGS
    // WHY: clear dirties only when persisted. On error, retain state.
    let mut frames = state.frames.write().await;
    let Some(frame_state) = frames.get_mut(&frame_id) else {
        return;
    };
    if !frame_state.subscribers.is_empty() {
        return;
    }

    match flush_result {
        Ok(()) => {
            for (render_id, x, y) in &flushed_placements {
                let can_clear = match frame_state.placements.get(render_id) {
                    Some(current) => current.x == *x && current.y == *y,
                    None => true,
                };
                if can_clear {
                    frame_state.dirty_placements.remove(render_id);
                }
            }
            for (render_id, batch_ts) in &flushed_movements {
                let can_clear = match frame_state.movements.get(render_id) {
                    Some(current) => current.batch_ts == *batch_ts,
                    None => true,
                };
                if can_clear {
                    frame_state.dirty_movements.remove(render_id);
                }
            }

            if frame_state.is_evictable() {
                frames.remove(&frame_id);
                info!(%frame_id, "evicted frame from memory");
            } else {
                tracing::warn!(
                    %frame_id,
                    "retaining frame after final flush because newer dirty rows exist"
                );
            }
        }
        Err(e) => {
            tracing::error!(error = %e, %frame_id, "final flush failed; frame retained for retry");
        }
    }
}

/// Number of live subscribers on a frame.
pub async fn participant_count(state: &AppState, frame_id: Uuid) -> usize {
    let frames = state.frames.read().await;
    frames.get(&frame_id).map_or(0, |fs| fs.subscribers.len())
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Broadcast a feed event to all subscribers of a frame, optionally
/// excluding one.
pub async fn broadcast(state: &AppState, frame_id: Uuid, event: &FeedEvent, exclude: Option<Uuid>) {
    let frames = state.frames.read().await;
    let Some(frame_state) = frames.get(&frame_id) else {
        return;
    };

    for (participant_id, tx) in &frame_state.subscribers {
        if exclude == Some(*participant_id) {
            continue;
        }
        // Best-effort: if a subscriber's channel is full, skip it. A missed
        // push is caught up by the next full-record-set refresh.
        let _ = tx.try_send(event.clone());
    }
}

/// Push the frame's full movement record set to every subscriber, the
/// writer included.
pub async fn broadcast_movements(state: &AppState, frame_id: Uuid) {
    let Ok(records) = movement::movement_feed(state, frame_id).await else {
        return;
    };
    broadcast(state, frame_id, &FeedEvent::Movements { records }, None).await;
}

/// Push the current participant count to every subscriber.
pub async fn broadcast_presence(state: &AppState, frame_id: Uuid) {
    let participants = participant_count(state, frame_id).await;
    let event = FeedEvent::Presence { participants, alone: participants <= 1 };
    broadcast(state, frame_id, &event, None).await;
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
