//! Per-frame sync engine: local gesture ingestion, mode-aware publishing,
//! echo suppression, and replay hand-off.
//!
//! DESIGN
//! ======
//! The engine is a cheaply cloneable handle; the node map, processed-batch
//! set, and outbound buffer live behind one mutex owned by the session.
//! Entry points are synchronous and never perform I/O under the lock —
//! network calls run on detached tasks so stopping a timer can never abort
//! an in-flight request (its result is simply ignored after teardown).
//!
//! Mode switches lose nothing: buffered entries re-arm through the debounce
//! path when the session goes solo, and armed debounce nodes re-enter the
//! outbound buffer when a second participant appears.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::CanvasNode;
use crate::sync::SyncConfig;
use crate::sync::debounce::NodeDebouncer;
use crate::sync::replay::ReplayQueue;
use crate::sync::transport::SyncTransport;
use crate::wire::{self, BatchEntry, MovementRecord, Position};

// =============================================================================
// TYPES
// =============================================================================

/// Which publishing path is active for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Single participant: debounced direct writes, no batching machinery.
    Solo,
    /// Multiple participants: timed batch flush plus staggered replay.
    Collaborative,
}

/// Client-side view of one placed node; the node map's value type.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownNode {
    pub render_id: String,
    pub domain_ref: Uuid,
    pub kind: String,
    pub position: Position,
}

impl From<CanvasNode> for KnownNode {
    fn from(node: CanvasNode) -> Self {
        Self {
            position: node.position(),
            render_id: node.render_id,
            domain_ref: node.domain_ref,
            kind: node.kind,
        }
    }
}

/// A position update for the render layer to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPatch {
    pub render_id: String,
    pub position: Position,
}

fn entry_from(node: &KnownNode) -> BatchEntry {
    BatchEntry {
        render_id: node.render_id.clone(),
        position: node.position,
        kind: node.kind.clone(),
        domain_ref: node.domain_ref,
    }
}

// =============================================================================
// ENGINE STATE
// =============================================================================

struct EngineInner {
    /// Source of truth for rendering: render id -> latest known node state.
    nodes: HashMap<String, KnownNode>,
    /// Batch identities already sent or already applied.
    processed: HashSet<String>,
    /// Collaborative-mode outbound buffer, oldest first.
    outbound: VecDeque<BatchEntry>,
    /// Self-write flag: true while a flush call is in flight.
    publishing: bool,
    mode: SyncMode,
    closed: bool,
}

#[derive(Default)]
struct Tasks {
    flush: Option<JoinHandle<()>>,
    feed: Option<JoinHandle<()>>,
    debounce: NodeDebouncer,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Sync engine handle for one open frame session.
#[derive(Clone)]
pub struct SyncEngine {
    frame_id: Uuid,
    cfg: SyncConfig,
    transport: Arc<dyn SyncTransport>,
    inner: Arc<Mutex<EngineInner>>,
    tasks: Arc<Mutex<Tasks>>,
    replay: Arc<ReplayQueue>,
}

impl SyncEngine {
    /// Create an engine for a frame. Starts in solo mode with an idle
    /// replay worker; the returned receiver yields render patches as
    /// remote batches apply.
    #[must_use]
    pub fn new(
        frame_id: Uuid,
        cfg: SyncConfig,
        transport: Arc<dyn SyncTransport>,
    ) -> (Self, mpsc::UnboundedReceiver<RenderPatch>) {
        let (patch_tx, patch_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Mutex::new(EngineInner {
            nodes: HashMap::new(),
            processed: HashSet::new(),
            outbound: VecDeque::new(),
            publishing: false,
            mode: SyncMode::Solo,
            closed: false,
        }));

        let replay = {
            let inner = Arc::clone(&inner);
            ReplayQueue::spawn(cfg.replay_stagger, move |entry| {
                apply_remote_entry(&inner, &patch_tx, entry);
            })
        };

        let engine = Self {
            frame_id,
            cfg,
            transport,
            inner,
            tasks: Arc::new(Mutex::new(Tasks::default())),
            replay: Arc::new(replay),
        };
        (engine, patch_rx)
    }

    fn lock_inner(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // SEEDING
    // =========================================================================

    /// Populate (or refresh) the node map from the placement list.
    pub fn seed_nodes<I>(&self, nodes: I)
    where
        I: IntoIterator<Item = KnownNode>,
    {
        let mut inner = self.lock_inner();
        if inner.closed {
            return;
        }
        for node in nodes {
            inner.nodes.insert(node.render_id.clone(), node);
        }
    }

    /// Apply an authoritative removal: drop the node from the map, cancel
    /// its debounce timer, and purge it from the outbound buffer.
    pub fn forget_node(&self, render_id: &str) {
        let mut tasks = self.lock_tasks();
        tasks.debounce.cancel(render_id);
        let mut inner = self.lock_inner();
        inner.nodes.remove(render_id);
        inner.outbound.retain(|e| e.render_id != render_id);
    }

    // =========================================================================
    // LOCAL GESTURES
    // =========================================================================

    /// Accept a position change from the render layer.
    ///
    /// Changes for pending or unknown nodes are dropped. Accepted changes
    /// update the node map immediately, then route to the debounce path
    /// (solo) or the outbound buffer (collaborative).
    pub fn on_local_position_change(&self, render_id: &str, position: Position) {
        if wire::is_pending(render_id) {
            debug!(render_id, "ignoring position change for pending node");
            return;
        }
        if !wire::position_is_finite(position) {
            debug!(render_id, "ignoring non-finite position change");
            return;
        }

        let mode = {
            let mut inner = self.lock_inner();
            if inner.closed {
                return;
            }
            let Some(node) = inner.nodes.get_mut(render_id) else {
                debug!(render_id, "ignoring position change for unknown node");
                return;
            };
            node.position = position;
            let entry = entry_from(node);
            let mode = inner.mode;
            if mode == SyncMode::Collaborative {
                inner.outbound.push_back(entry);
            }
            mode
        };

        if mode == SyncMode::Solo {
            let mut tasks = self.lock_tasks();
            self.arm_debounce(&mut tasks, render_id);
        }
    }

    // =========================================================================
    // MODE SELECTION
    // =========================================================================

    /// Switch between solo and collaborative publishing as participants
    /// come and go. No buffered or debounced update is lost across a
    /// switch; it changes path, not fate.
    pub fn on_mode_change(&self, is_alone: bool) {
        let target = if is_alone { SyncMode::Solo } else { SyncMode::Collaborative };

        let mut tasks = self.lock_tasks();
        let rearm = {
            let mut inner = self.lock_inner();
            if inner.closed || inner.mode == target {
                return;
            }
            inner.mode = target;

            match target {
                SyncMode::Solo => {
                    // Keep the latest buffered entry per node; each re-arms
                    // through the debounce path below.
                    let mut drained: Vec<BatchEntry> = Vec::new();
                    while let Some(entry) = inner.outbound.pop_front() {
                        drained.retain(|e| e.render_id != entry.render_id);
                        drained.push(entry);
                    }
                    drained
                }
                SyncMode::Collaborative => {
                    // Armed debounce nodes re-enter the buffer at their
                    // latest known position.
                    for render_id in tasks.debounce.cancel_all() {
                        if let Some(node) = inner.nodes.get(&render_id) {
                            let entry = entry_from(node);
                            inner.outbound.push_back(entry);
                        }
                    }
                    Vec::new()
                }
            }
        };

        match target {
            SyncMode::Solo => {
                if let Some(handle) = tasks.flush.take() {
                    handle.abort();
                }
                for entry in &rearm {
                    self.arm_debounce(&mut tasks, &entry.render_id);
                }
            }
            SyncMode::Collaborative => {
                if tasks.flush.is_none() {
                    tasks.flush = Some(self.spawn_flush_task());
                }
            }
        }
    }

    // =========================================================================
    // SOLO PATH
    // =========================================================================

    fn arm_debounce(&self, tasks: &mut Tasks, render_id: &str) {
        let engine = self.clone();
        let render_id_owned = render_id.to_owned();
        let delay = self.cfg.debounce;
        tasks.debounce.restart(render_id, async move {
            tokio::time::sleep(delay).await;
            engine.fire_debounce(render_id_owned);
        });
    }

    fn fire_debounce(&self, render_id: String) {
        let position = {
            let inner = self.lock_inner();
            if inner.closed {
                return;
            }
            let Some(node) = inner.nodes.get(&render_id) else {
                return;
            };
            node.position
        };

        // Detached: a later re-arm aborts only un-fired timers, never a
        // write already on the wire.
        let engine = self.clone();
        tokio::spawn(async move {
            match engine
                .transport
                .update_node_position(engine.frame_id, &render_id, position)
                .await
            {
                Ok(Some(_)) => {}
                Ok(None) => debug!(%render_id, "debounced write dropped; node was removed"),
                Err(e) => warn!(%render_id, error = %e, "debounced position write failed"),
            }
        });
    }

    // =========================================================================
    // COLLABORATIVE PATH
    // =========================================================================

    fn spawn_flush_task(&self) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + engine.cfg.flush_interval;
            let mut ticker = tokio::time::interval_at(start, engine.cfg.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let drained = {
                    let mut inner = engine.lock_inner();
                    if inner.closed || inner.mode != SyncMode::Collaborative {
                        break;
                    }
                    if inner.publishing || inner.outbound.is_empty() {
                        continue;
                    }
                    let take = inner.outbound.len().min(engine.cfg.max_batch_len);
                    let drained: Vec<BatchEntry> = inner.outbound.drain(..take).collect();
                    inner.publishing = true;
                    drained
                };

                // Detached: stopping the ticker must not abort the call.
                let publisher = engine.clone();
                tokio::spawn(async move { publisher.publish_batch(drained).await });
            }
        })
    }

    async fn publish_batch(&self, batch: Vec<BatchEntry>) {
        let count = batch.len();
        match self.transport.ingest_batch(self.frame_id, batch.clone()).await {
            Ok(batch_id) => {
                let mut inner = self.lock_inner();
                inner.processed.insert(batch_id);
                inner.publishing = false;
            }
            Err(e) => {
                warn!(frame_id = %self.frame_id, count, error = %e, "batch flush failed; entries re-buffered");
                let mut inner = self.lock_inner();
                inner.publishing = false;
                if inner.closed {
                    return;
                }
                // Back to the front so ordering survives for the next cycle.
                for entry in batch.into_iter().rev() {
                    inner.outbound.push_front(entry);
                }
            }
        }
    }

    // =========================================================================
    // INBOUND FEED
    // =========================================================================

    /// Process one feed refresh. Only the newest record matters; its batch
    /// is queued for staggered replay unless it is this client's own echo
    /// (in-flight flush, or an identity already in the processed set).
    pub fn observe_feed(&self, records: &[MovementRecord]) {
        let batch = {
            let mut inner = self.lock_inner();
            if inner.closed || inner.publishing {
                return;
            }
            let Some(latest) = wire::latest_record(records) else {
                return;
            };
            let identity = latest.identity();
            if !inner.processed.insert(identity) {
                return;
            }
            latest.batch.clone()
        };
        self.replay.enqueue(batch);
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Tear the session down: stop every timer and worker, discard the node
    /// map, processed set, and outbound buffer. In-flight network calls are
    /// not aborted; their results land in the closed state and are ignored.
    pub fn close(&self) {
        {
            let mut inner = self.lock_inner();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.nodes.clear();
            inner.processed.clear();
            inner.outbound.clear();
        }

        let mut tasks = self.lock_tasks();
        if let Some(handle) = tasks.flush.take() {
            handle.abort();
        }
        if let Some(handle) = tasks.feed.take() {
            handle.abort();
        }
        tasks.debounce.cancel_all();
        self.replay.shutdown();
    }

    pub(crate) fn set_feed_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.lock_tasks();
        if let Some(previous) = tasks.feed.replace(handle) {
            previous.abort();
        }
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    #[must_use]
    pub fn frame_id(&self) -> Uuid {
        self.frame_id
    }

    /// Latest known position for a node, local or replayed.
    #[must_use]
    pub fn node_position(&self, render_id: &str) -> Option<Position> {
        self.lock_inner().nodes.get(render_id).map(|n| n.position)
    }

    #[must_use]
    pub fn mode(&self) -> SyncMode {
        self.lock_inner().mode
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_inner().closed
    }

    /// Entries waiting for the next collaborative flush.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.lock_inner().outbound.len()
    }
}

// =============================================================================
// REPLAY APPLICATION
// =============================================================================

fn apply_remote_entry(
    inner: &Mutex<EngineInner>,
    patch_tx: &mpsc::UnboundedSender<RenderPatch>,
    entry: &BatchEntry,
) {
    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
    if inner.closed {
        return;
    }
    let Some(node) = inner.nodes.get_mut(&entry.render_id) else {
        debug!(render_id = %entry.render_id, "replay entry for unknown node skipped");
        return;
    };
    node.position = entry.position;
    drop(inner);

    let _ = patch_tx.send(RenderPatch {
        render_id: entry.render_id.clone(),
        position: entry.position,
    });
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
