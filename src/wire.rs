//! Wire-level data shapes shared by the server API and the client engine.
//!
//! DESIGN
//! ======
//! Both sides of the movement protocol speak the same types: batch entries
//! going up, movement records and feed events coming down. Validation lives
//! here so the server rejects malformed batches at the boundary and the
//! client never builds one in the first place.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum number of entries the client sends in one flush. Surplus entries
/// stay buffered for the next cycle.
pub const MAX_BATCH_LEN: usize = 100;

/// Render-id prefix for nodes that exist locally but have not been persisted
/// yet. Position changes for these are dropped until creation completes.
pub const PENDING_PREFIX: &str = "pending-";

// =============================================================================
// TYPES
// =============================================================================

/// A 2D position on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One node-position update inside a movement batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Client-assigned render identifier, stable for the node's lifetime on
    /// the frame.
    pub render_id: String,
    pub position: Position,
    /// Render type tag (e.g. `"text"`, `"image"`).
    pub kind: String,
    /// Reference to the underlying domain entity.
    pub domain_ref: Uuid,
}

/// The server-persisted latest batch for one (frame, node) pair.
///
/// Every entry of a committed batch gets its own record carrying the whole
/// batch. The redundancy is deliberate: any single node's record can
/// reconstruct the full co-movement group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    /// Row id. Stable across overwrites of the same (frame, node) pair.
    pub record_id: Uuid,
    pub render_id: String,
    pub batch: Vec<BatchEntry>,
    /// Commit time in milliseconds since the Unix epoch.
    pub batch_ts: i64,
}

impl MovementRecord {
    /// Feed identity of this record at its current timestamp. Batch ingest
    /// returns the same shape for its last-written record, which is what
    /// lets a sender recognize its own echo.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}-{}", self.record_id, self.batch_ts)
    }
}

/// Events pushed to feed subscribers over the frame socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    /// First event after subscribing.
    Connected {
        participant_id: Uuid,
        color: String,
        alone: bool,
    },
    /// A participant joined or left the frame.
    Presence { participants: usize, alone: bool },
    /// The full movement record set for the frame, ascending by timestamp.
    /// Delivered to every subscriber, the writer included.
    Movements { records: Vec<MovementRecord> },
}

// =============================================================================
// VALIDATION
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BatchShapeError {
    #[error("batch is empty")]
    Empty,
    #[error("entry {index} has a blank render id")]
    BlankRenderId { index: usize },
    #[error("entry for {render_id} has a non-finite coordinate")]
    NonFiniteCoordinate { render_id: String },
}

/// Check a position for NaN/infinite coordinates.
#[must_use]
pub fn position_is_finite(position: Position) -> bool {
    position.x.is_finite() && position.y.is_finite()
}

/// Validate the shape of an inbound movement batch.
///
/// # Errors
///
/// Returns the first shape violation found: an empty batch, a blank render
/// id, or a non-finite coordinate.
pub fn validate_batch(batch: &[BatchEntry]) -> Result<(), BatchShapeError> {
    if batch.is_empty() {
        return Err(BatchShapeError::Empty);
    }
    for (index, entry) in batch.iter().enumerate() {
        if entry.render_id.trim().is_empty() {
            return Err(BatchShapeError::BlankRenderId { index });
        }
        if !position_is_finite(entry.position) {
            return Err(BatchShapeError::NonFiniteCoordinate { render_id: entry.render_id.clone() });
        }
    }
    Ok(())
}

/// True for render ids of nodes that have not been persisted yet.
#[must_use]
pub fn is_pending(render_id: &str) -> bool {
    render_id.starts_with(PENDING_PREFIX)
}

// =============================================================================
// FEED HELPERS
// =============================================================================

/// The newest record in a feed snapshot, by explicit max-by rather than
/// list position. Ties on timestamp break by record id so the choice is
/// deterministic.
#[must_use]
pub fn latest_record(records: &[MovementRecord]) -> Option<&MovementRecord> {
    records.iter().max_by_key(|r| (r.batch_ts, r.record_id))
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod tests;
