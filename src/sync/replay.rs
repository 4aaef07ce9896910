//! Serialized, staggered replay of remote movement batches.
//!
//! DESIGN
//! ======
//! A single worker drains a FIFO queue one batch at a time — never two
//! batches concurrently. Within a batch, entries apply in their original
//! order with a fixed stagger between them, which turns an instantaneous
//! bulk update into a readable animation of the remote drag. Once a batch
//! starts it always finishes; the next one begins only after the current
//! batch fully drains.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::wire::BatchEntry;

/// Handle to the replay worker for one engine session.
pub struct ReplayQueue {
    tx: mpsc::UnboundedSender<Vec<BatchEntry>>,
    worker: JoinHandle<()>,
}

impl ReplayQueue {
    /// Spawn the worker. `apply` runs once per entry, in order.
    pub fn spawn<F>(stagger: Duration, mut apply: F) -> Self
    where
        F: FnMut(&BatchEntry) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<BatchEntry>>();
        let worker = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                for (index, entry) in batch.iter().enumerate() {
                    if index > 0 {
                        tokio::time::sleep(stagger).await;
                    }
                    apply(entry);
                }
            }
        });
        Self { tx, worker }
    }

    /// Queue a batch for staggered application. Order of arrival is order
    /// of application.
    pub fn enqueue(&self, batch: Vec<BatchEntry>) {
        let _ = self.tx.send(batch);
    }

    /// Stop the worker. A batch mid-application is abandoned; this only
    /// happens on session teardown, where the node map is discarded anyway.
    pub fn shutdown(&self) {
        self.worker.abort();
    }
}

#[cfg(test)]
#[path = "replay_test.rs"]
mod tests;
