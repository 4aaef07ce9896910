use super::*;
use std::sync::{Arc, Mutex};
use tokio::time::{Instant, sleep};
use uuid::Uuid;

use crate::wire::Position;

fn entry(render_id: &str) -> BatchEntry {
    BatchEntry {
        render_id: render_id.into(),
        position: Position::new(1.0, 1.0),
        kind: "text".into(),
        domain_ref: Uuid::new_v4(),
    }
}

fn recording_queue(stagger_ms: u64) -> (ReplayQueue, Arc<Mutex<Vec<(String, Instant)>>>) {
    let applied: Arc<Mutex<Vec<(String, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&applied);
    let queue = ReplayQueue::spawn(Duration::from_millis(stagger_ms), move |entry| {
        sink.lock().unwrap().push((entry.render_id.clone(), Instant::now()));
    });
    (queue, applied)
}

#[tokio::test(start_paused = true)]
async fn entries_apply_in_original_order() {
    let (queue, applied) = recording_queue(15);
    queue.enqueue(vec![entry("a"), entry("b"), entry("c")]);

    sleep(Duration::from_millis(200)).await;

    let applied = applied.lock().unwrap();
    let order: Vec<&str> = applied.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn entries_are_staggered_not_simultaneous() {
    let (queue, applied) = recording_queue(15);
    queue.enqueue(vec![entry("a"), entry("b"), entry("c")]);

    sleep(Duration::from_millis(200)).await;

    let applied = applied.lock().unwrap();
    assert_eq!(applied.len(), 3);
    let gap_ab = applied[1].1.duration_since(applied[0].1);
    let gap_bc = applied[2].1.duration_since(applied[1].1);
    assert_eq!(gap_ab, Duration::from_millis(15));
    assert_eq!(gap_bc, Duration::from_millis(15));
}

#[tokio::test(start_paused = true)]
async fn batches_are_strictly_serialized() {
    let (queue, applied) = recording_queue(15);
    queue.enqueue(vec![entry("a1"), entry("a2"), entry("a3")]);
    queue.enqueue(vec![entry("b1"), entry("b2")]);

    sleep(Duration::from_millis(300)).await;

    let applied = applied.lock().unwrap();
    let order: Vec<&str> = applied.iter().map(|(id, _)| id.as_str()).collect();
    // The second batch never interleaves with the first.
    assert_eq!(order, vec!["a1", "a2", "a3", "b1", "b2"]);
    // And it starts only after the first fully drained.
    assert!(applied[3].1 >= applied[2].1);
}

#[tokio::test(start_paused = true)]
async fn single_entry_batch_applies_immediately() {
    let (queue, applied) = recording_queue(15);
    let before = Instant::now();
    queue.enqueue(vec![entry("only")]);

    sleep(Duration::from_millis(50)).await;

    let applied = applied.lock().unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].1.duration_since(before), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_worker() {
    let (queue, applied) = recording_queue(15);
    queue.shutdown();
    queue.enqueue(vec![entry("late")]);

    sleep(Duration::from_millis(100)).await;
    assert!(applied.lock().unwrap().is_empty());
}
