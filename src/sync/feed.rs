//! Live feed listener — frame socket client for the sync engine.
//!
//! DESIGN
//! ======
//! Connects to the server's frame socket and forwards events into the
//! engine: movement refreshes feed `observe_feed`, presence changes drive
//! mode selection. Reconnects with exponential backoff; a reconnect is
//! harmless because the first push after subscribing is always the full
//! record set, so any update missed while disconnected is implicitly
//! caught up.

use std::time::Duration;

use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::sync::engine::SyncEngine;
use crate::wire::FeedEvent;

const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 10_000;

/// Spawn the listener for an engine and register it for teardown. The
/// task ends when the engine closes.
pub fn spawn_feed_listener(engine: &SyncEngine, ws_url: impl Into<String>) {
    let engine_handle = engine.clone();
    let ws_url = ws_url.into();

    let handle = tokio::spawn(async move {
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        loop {
            if engine_handle.is_closed() {
                break;
            }

            match connect_async(ws_url.as_str()).await {
                Ok((mut stream, _)) => {
                    debug!(url = %ws_url, "feed listener connected");
                    backoff_ms = INITIAL_BACKOFF_MS;

                    while let Some(message) = stream.next().await {
                        if engine_handle.is_closed() {
                            return;
                        }
                        match message {
                            Ok(Message::Text(text)) => handle_feed_text(&engine_handle, text.as_str()),
                            Ok(Message::Close(_)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %ws_url, error = %e, "feed connect failed");
                }
            }

            if engine_handle.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
        }
    });

    // Register so `close()` tears the listener down with the session.
    engine.set_feed_task(handle);
}

/// Dispatch one feed message into the engine.
pub(crate) fn handle_feed_text(engine: &SyncEngine, text: &str) {
    let event: FeedEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "ignoring undecodable feed event");
            return;
        }
    };

    match event {
        FeedEvent::Connected { alone, .. } | FeedEvent::Presence { alone, .. } => {
            engine.on_mode_change(alone);
        }
        FeedEvent::Movements { records } => {
            engine.observe_feed(&records);
        }
    }
}

#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;
