use super::*;
use crate::state::test_helpers;

#[tokio::test]
async fn place_node_succeeds() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    let node = place_node(&state, frame_id, "n1", Uuid::new_v4(), "text", Position::new(10.0, 20.0))
        .await
        .unwrap();
    assert_eq!(node.render_id, "n1");
    assert!((node.x - 10.0).abs() < f64::EPSILON);
    assert!((node.y - 20.0).abs() < f64::EPSILON);

    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    assert!(frame.placements.contains_key("n1"));
    assert!(frame.dirty_placements.contains("n1"));
}

#[tokio::test]
async fn place_node_rejects_duplicate_render_id() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    place_node(&state, frame_id, "n1", Uuid::new_v4(), "text", Position::new(0.0, 0.0))
        .await
        .unwrap();
    let result = place_node(&state, frame_id, "n1", Uuid::new_v4(), "image", Position::new(1.0, 1.0)).await;
    assert!(matches!(result.unwrap_err(), PlacementError::DuplicateRenderId(_)));
}

#[tokio::test]
async fn place_node_rejects_blank_render_id_and_bad_coordinates() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    let result = place_node(&state, frame_id, "  ", Uuid::new_v4(), "text", Position::new(0.0, 0.0)).await;
    assert!(matches!(result.unwrap_err(), PlacementError::InvalidShape(_)));

    let result = place_node(&state, frame_id, "n1", Uuid::new_v4(), "text", Position::new(f64::NAN, 0.0)).await;
    assert!(matches!(result.unwrap_err(), PlacementError::InvalidShape(_)));
}

#[tokio::test]
async fn update_position_moves_existing_node() {
    let state = test_helpers::test_app_state();
    let node = test_helpers::dummy_node("n1");
    let node_id = node.id;
    let frame_id = test_helpers::seed_frame_with_nodes(&state, vec![node]).await;

    let result = update_position(&state, frame_id, "n1", Position::new(55.0, 66.0))
        .await
        .unwrap();
    assert_eq!(result, Some(node_id));

    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    let moved = frame.placements.get("n1").unwrap();
    assert!((moved.x - 55.0).abs() < f64::EPSILON);
    assert!((moved.y - 66.0).abs() < f64::EPSILON);
    assert!(frame.dirty_placements.contains("n1"));
}

#[tokio::test]
async fn update_position_for_removed_node_is_silent_noop() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame(&state).await;

    let result = update_position(&state, frame_id, "gone", Position::new(1.0, 2.0))
        .await
        .unwrap();
    assert_eq!(result, None);

    // Nothing was created or dirtied.
    let frames = state.frames.read().await;
    let frame = frames.get(&frame_id).unwrap();
    assert!(frame.placements.is_empty());
    assert!(frame.dirty_placements.is_empty());
}

#[tokio::test]
async fn update_position_unloaded_frame_errors() {
    let state = test_helpers::test_app_state();
    let result = update_position(&state, Uuid::new_v4(), "n1", Position::new(0.0, 0.0)).await;
    assert!(matches!(result.unwrap_err(), PlacementError::FrameNotLoaded(_)));
}

#[tokio::test]
async fn list_nodes_is_sorted_by_render_id() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame_with_nodes(
        &state,
        vec![
            test_helpers::dummy_node("charlie"),
            test_helpers::dummy_node("alpha"),
            test_helpers::dummy_node("bravo"),
        ],
    )
    .await;

    let nodes = list_nodes(&state, frame_id).await.unwrap();
    let ids: Vec<&str> = nodes.iter().map(|n| n.render_id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "bravo", "charlie"]);
}

#[tokio::test]
#[ignore = "remove_node hits Postgres via sqlx::query"]
async fn remove_node_deletes_from_memory() {
    let state = test_helpers::test_app_state();
    let frame_id = test_helpers::seed_frame_with_nodes(&state, vec![test_helpers::dummy_node("n1")]).await;
    let _ = remove_node(&state, frame_id, "n1").await;
}
