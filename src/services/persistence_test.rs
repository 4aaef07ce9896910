use super::*;
use crate::services::movement;
use crate::state::test_helpers;
use crate::wire::{BatchEntry, Position};

fn entry(render_id: &str, x: f64, y: f64) -> BatchEntry {
    BatchEntry {
        render_id: render_id.into(),
        position: Position::new(x, y),
        kind: "text".into(),
        domain_ref: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn failed_flush_retains_dirty_flags() {
    // The lazy test pool has no live database behind it, so the write fails
    // and the dirty flags must survive for the next cycle.
    let state = test_helpers::test_app_state();
    let node = test_helpers::dummy_node("n1");
    let frame_id = test_helpers::seed_frame_with_nodes(&state, vec![node]).await;

    movement::ingest_batch(&state, frame_id, vec![entry("n1", 5.0, 5.0)])
        .await
        .unwrap();

    flush_all_dirty_for_tests(&state).await;

    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    assert!(frame.dirty_placements.contains("n1"));
    assert!(frame.dirty_movements.contains("n1"));
}

#[tokio::test]
async fn clear_flushed_dirty_acks_unchanged_rows() {
    let state = test_helpers::test_app_state();
    let node = test_helpers::dummy_node("n1");
    let frame_id = test_helpers::seed_frame_with_nodes(&state, vec![node]).await;

    movement::ingest_batch(&state, frame_id, vec![entry("n1", 5.0, 5.0)])
        .await
        .unwrap();
    let batch_ts = {
        let frames = state.frames.read().await;
        frames.get(&frame_id).unwrap().movements.get("n1").unwrap().batch_ts
    };

    // Simulate a successful write of exactly the current state.
    clear_flushed_dirty(&state, frame_id, &[("n1".into(), 5.0, 5.0)], &[("n1".into(), batch_ts)]).await;

    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    assert!(frame.dirty_placements.is_empty());
    assert!(frame.dirty_movements.is_empty());
}

#[tokio::test]
async fn clear_flushed_dirty_retains_rows_changed_after_snapshot() {
    let state = test_helpers::test_app_state();
    let node = test_helpers::dummy_node("n1");
    let frame_id = test_helpers::seed_frame_with_nodes(&state, vec![node]).await;

    movement::ingest_batch(&state, frame_id, vec![entry("n1", 5.0, 5.0)])
        .await
        .unwrap();

    // Snapshot claims the node was flushed at a stale position/timestamp.
    clear_flushed_dirty(&state, frame_id, &[("n1".into(), 1.0, 1.0)], &[("n1".into(), 0)]).await;

    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    assert!(frame.dirty_placements.contains("n1"));
    assert!(frame.dirty_movements.contains("n1"));
}

#[tokio::test]
async fn clear_flushed_dirty_acks_rows_removed_meanwhile() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    {
        let mut frames = state.frames.write().await;
        let frame = frames.get_mut(&frame_id).unwrap();
        frame.dirty_placements.insert("gone".into());
    }

    clear_flushed_dirty(&state, frame_id, &[("gone".into(), 0.0, 0.0)], &[]).await;

    let frames = state.frames.read().await;
    assert!(frames.get(&frame_id).unwrap().dirty_placements.is_empty());
}

#[tokio::test]
#[ignore = "requires a live database"]
async fn flush_writes_and_clears_dirty() {
    let state = test_helpers::test_app_state();
    let node = test_helpers::dummy_node("n1");
    let frame_id = test_helpers::seed_frame_with_nodes(&state, vec![node]).await;

    movement::ingest_batch(&state, frame_id, vec![entry("n1", 5.0, 5.0)])
        .await
        .unwrap();
    flush_all_dirty_for_tests(&state).await;

    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    assert!(frame.dirty_placements.is_empty());
    assert!(frame.dirty_movements.is_empty());
}
