//! Restartable per-node debounce timers.
//!
//! DESIGN
//! ======
//! One timer per render id. Re-arming a node cancels its pending timer and
//! starts a fresh one, so a burst of drag events collapses into a single
//! fire carrying whatever position is current when the quiet period ends.
//! Cancellation is synchronous (`JoinHandle::abort`) and idempotent.

use std::collections::HashMap;

use tokio::task::JoinHandle;

/// Timer registry for the solo-mode debounce path.
#[derive(Default)]
pub struct NodeDebouncer {
    timers: HashMap<String, JoinHandle<()>>,
}

impl NodeDebouncer {
    #[must_use]
    pub fn new() -> Self {
        Self { timers: HashMap::new() }
    }

    /// Cancel any pending timer for the node and arm a new one running
    /// `fire` after the caller-chosen delay (the future owns its sleep).
    pub fn restart<F>(&mut self, render_id: &str, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(previous) = self.timers.remove(render_id) {
            previous.abort();
        }
        self.timers.insert(render_id.to_owned(), tokio::spawn(fire));
    }

    /// Cancel a node's pending timer, if any. Safe to call repeatedly.
    pub fn cancel(&mut self, render_id: &str) {
        if let Some(handle) = self.timers.remove(render_id) {
            handle.abort();
        }
    }

    /// Cancel every pending timer and return the render ids that were armed.
    pub fn cancel_all(&mut self) -> Vec<String> {
        let mut armed: Vec<String> = Vec::with_capacity(self.timers.len());
        for (render_id, handle) in self.timers.drain() {
            handle.abort();
            armed.push(render_id);
        }
        armed.sort();
        armed
    }

    /// Number of armed timers. Finished timers still count until re-armed or
    /// cancelled; callers only use this for teardown accounting.
    #[must_use]
    pub fn armed_len(&self) -> usize {
        self.timers.len()
    }
}

#[cfg(test)]
#[path = "debounce_test.rs"]
mod tests;
