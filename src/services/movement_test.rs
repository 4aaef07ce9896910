use super::*;
use crate::state::test_helpers;
use crate::wire::Position;

fn entry(render_id: &str, x: f64, y: f64) -> BatchEntry {
    BatchEntry {
        render_id: render_id.into(),
        position: Position::new(x, y),
        kind: "text".into(),
        domain_ref: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn ingest_creates_one_record_per_entry_sharing_the_batch() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    let batch = vec![entry("n1", 10.0, 10.0), entry("n2", 5.0, 5.0)];
    ingest_batch(&state, frame_id, batch.clone()).await.unwrap();

    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    assert_eq!(frame.movements.len(), 2);

    let r1 = frame.movements.get("n1").unwrap();
    let r2 = frame.movements.get("n2").unwrap();
    // Both records redundantly carry the whole co-movement group.
    assert_eq!(r1.batch, batch);
    assert_eq!(r2.batch, batch);
    assert_eq!(r1.batch_ts, r2.batch_ts);
    assert_ne!(r1.record_id, r2.record_id);
}

#[tokio::test]
async fn ingest_returns_last_record_identity() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    let batch_id = ingest_batch(&state, frame_id, vec![entry("n1", 1.0, 1.0), entry("n2", 2.0, 2.0)])
        .await
        .unwrap();

    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    let last = frame.movements.get("n2").unwrap();
    assert_eq!(batch_id, last.identity());
}

#[tokio::test]
async fn reingest_overwrites_record_and_keeps_row_id() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    ingest_batch(&state, frame_id, vec![entry("n1", 1.0, 1.0)]).await.unwrap();
    let first_id = {
        let frames = state.frames.read().await;
        frames.get(&frame_id).unwrap().movements.get("n1").unwrap().record_id
    };

    ingest_batch(&state, frame_id, vec![entry("n1", 9.0, 9.0)]).await.unwrap();

    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    // Still exactly one record for the node; no history retained.
    assert_eq!(frame.movements.len(), 1);
    let record = frame.movements.get("n1").unwrap();
    assert_eq!(record.record_id, first_id);
    assert!((record.batch[0].position.x - 9.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn ingest_applies_positions_to_placements() {
    let state = test_helpers::test_app_state();
    let node = test_helpers::dummy_node("n1");
    let frame_id = test_helpers::seed_frame_with_nodes(&state, vec![node]).await;

    ingest_batch(&state, frame_id, vec![entry("n1", 42.0, 24.0)]).await.unwrap();

    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    let placed = frame.placements.get("n1").unwrap();
    assert!((placed.x - 42.0).abs() < f64::EPSILON);
    assert!((placed.y - 24.0).abs() < f64::EPSILON);
    assert!(frame.dirty_placements.contains("n1"));
    assert!(frame.dirty_movements.contains("n1"));
}

#[tokio::test]
async fn ingest_rejects_empty_batch() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    let result = ingest_batch(&state, frame_id, vec![]).await;
    assert!(matches!(result.unwrap_err(), MovementError::InvalidBatch(BatchShapeError::Empty)));
}

#[tokio::test]
async fn ingest_rejects_unloaded_frame() {
    let state = test_helpers::test_app_state();
    let result = ingest_batch(&state, Uuid::new_v4(), vec![entry("n1", 1.0, 1.0)]).await;
    assert!(matches!(result.unwrap_err(), MovementError::FrameNotLoaded(_)));
}

#[tokio::test]
async fn feed_is_ascending_by_timestamp() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    // Write timestamps directly so ordering doesn't depend on the clock.
    {
        let mut frames = state.frames.write().await;
        let frame = frames.get_mut(&frame_id).unwrap();
        for (render_id, ts) in [("a", 300_i64), ("b", 100), ("c", 200)] {
            frame.movements.insert(
                render_id.into(),
                MovementRecord {
                    record_id: Uuid::new_v4(),
                    render_id: render_id.into(),
                    batch: vec![entry(render_id, 0.0, 0.0)],
                    batch_ts: ts,
                },
            );
        }
    }

    let records = movement_feed(&state, frame_id).await.unwrap();
    let timestamps: Vec<i64> = records.iter().map(|r| r.batch_ts).collect();
    assert_eq!(timestamps, vec![100, 200, 300]);
}

#[tokio::test]
async fn two_writers_converge_to_two_records() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    // Client A moves n1, client B moves n2, flushed as separate batches.
    ingest_batch(&state, frame_id, vec![entry("n1", 10.0, 10.0)]).await.unwrap();
    ingest_batch(&state, frame_id, vec![entry("n2", 5.0, 5.0)]).await.unwrap();

    let records = movement_feed(&state, frame_id).await.unwrap();
    assert_eq!(records.len(), 2);

    let n1 = records.iter().find(|r| r.render_id == "n1").unwrap();
    let n2 = records.iter().find(|r| r.render_id == "n2").unwrap();
    assert!((n1.batch[0].position.x - 10.0).abs() < f64::EPSILON);
    assert!((n2.batch[0].position.x - 5.0).abs() < f64::EPSILON);
}
