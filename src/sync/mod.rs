//! Client sync engine — keeps a frame's rendered node positions eventually
//! consistent across participants while drags are in progress.
//!
//! ARCHITECTURE
//! ============
//! One `SyncEngine` per open frame session. The engine owns the node map,
//! the processed-batch set, and the outbound buffer; nothing else touches
//! them. It runs in one of two modes:
//!
//! - **Solo** (single participant): each local change re-arms a per-node
//!   debounce timer; on fire, one direct position write goes out. No
//!   batching machinery runs at all.
//! - **Collaborative** (multiple participants): local changes accumulate in
//!   an outbound buffer that a recurring ticker flushes as one batch, while
//!   remote batches observed on the movement feed replay with a short
//!   stagger per entry so a peer's drag reads as motion, not teleportation.
//!
//! A client's own writes come back on the feed like everyone else's. The
//! engine suppresses them twice over: a self-write flag mutes feed
//! processing while a flush is in flight, and acknowledged batch identities
//! land in the processed set so a later refresh can't replay them.
//!
//! Remote I/O goes through the [`SyncTransport`] seam; the live feed
//! arrives via [`feed::spawn_feed_listener`] or any other caller of
//! [`SyncEngine::observe_feed`].

pub mod debounce;
pub mod engine;
pub mod feed;
pub mod replay;
pub mod transport;

pub use engine::{KnownNode, RenderPatch, SyncEngine, SyncMode};
pub use transport::{HttpTransport, SyncTransport, TransportError};

use std::time::Duration;

use crate::services::persistence::env_parse;
use crate::wire::MAX_BATCH_LEN;

const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 3_500;
const DEFAULT_REPLAY_STAGGER_MS: u64 = 15;

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Quiet period before a solo-mode position write goes out.
    pub debounce: Duration,
    /// Collaborative-mode flush cadence.
    pub flush_interval: Duration,
    /// Maximum entries per flushed batch; surplus stays buffered.
    pub max_batch_len: usize,
    /// Delay between entries while replaying a remote batch.
    pub replay_stagger: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            max_batch_len: MAX_BATCH_LEN,
            replay_stagger: Duration::from_millis(DEFAULT_REPLAY_STAGGER_MS),
        }
    }
}

impl SyncConfig {
    /// Load tunables from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            debounce: Duration::from_millis(env_parse("SYNC_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)),
            flush_interval: Duration::from_millis(env_parse("SYNC_FLUSH_INTERVAL_MS", DEFAULT_FLUSH_INTERVAL_MS)),
            max_batch_len: env_parse("SYNC_MAX_BATCH_LEN", MAX_BATCH_LEN),
            replay_stagger: Duration::from_millis(env_parse("SYNC_REPLAY_STAGGER_MS", DEFAULT_REPLAY_STAGGER_MS)),
        }
    }
}
