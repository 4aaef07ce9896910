use super::*;
use axum::http::HeaderValue;

#[test]
fn bearer_token_extraction() {
    let mut headers = HeaderMap::new();
    assert_eq!(bearer_token(&headers), None);

    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
    assert_eq!(bearer_token(&headers), Some("abc123"));

    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   padded  "));
    assert_eq!(bearer_token(&headers), Some("padded"));

    headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
    assert_eq!(bearer_token(&headers), None);
}

#[test]
fn access_errors_map_to_statuses() {
    let frame_id = Uuid::new_v4();
    assert_eq!(
        access_error_to_status(AccessError::Unauthorized(frame_id)),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        access_error_to_status(AccessError::FrameNotFound(frame_id)),
        StatusCode::NOT_FOUND
    );
}

#[test]
fn movement_errors_map_to_statuses() {
    assert_eq!(
        movement_error_to_status(movement::MovementError::FrameNotLoaded(Uuid::new_v4())),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        movement_error_to_status(movement::MovementError::InvalidBatch(
            crate::wire::BatchShapeError::Empty
        )),
        StatusCode::BAD_REQUEST
    );
}

#[test]
fn placement_errors_map_to_statuses() {
    assert_eq!(
        placement_error_to_status(placement::PlacementError::NotFound("n1".into())),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        placement_error_to_status(placement::PlacementError::DuplicateRenderId("n1".into())),
        StatusCode::CONFLICT
    );
}

#[test]
fn ingest_body_decodes_wire_shape() {
    let json = r#"{
        "batch": [
            {
                "render_id": "node-1",
                "position": {"x": 10.0, "y": 20.0},
                "kind": "text",
                "domain_ref": "8f14e45f-ceea-4673-9be1-7f4df24c1bb4"
            }
        ]
    }"#;
    let body: IngestBody = serde_json::from_str(json).unwrap();
    assert_eq!(body.batch.len(), 1);
    assert_eq!(body.batch[0].render_id, "node-1");
    assert!((body.batch[0].position.y - 20.0).abs() < f64::EPSILON);
}
