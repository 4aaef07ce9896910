//! Transport seam between the sync engine and the server API.
//!
//! DESIGN
//! ======
//! The engine only needs two remote operations: commit a batch and write a
//! single node's position. Both are expressed on a trait so tests can drive
//! the engine against an in-memory fake; `HttpTransport` is the production
//! implementation speaking the REST API.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::wire::{BatchEntry, MovementRecord, Position};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected request with status {status}")]
    Rejected { status: u16 },
}

/// Remote operations the engine performs.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Commit a movement batch; returns the server's batch identifier.
    async fn ingest_batch(&self, frame_id: Uuid, batch: Vec<BatchEntry>) -> Result<String, TransportError>;

    /// Solo-mode direct position write. `None` means the node was
    /// concurrently removed — a benign outcome, not an error.
    async fn update_node_position(
        &self,
        frame_id: Uuid,
        render_id: &str,
        position: Position,
    ) -> Result<Option<Uuid>, TransportError>;
}

// =============================================================================
// HTTP TRANSPORT
// =============================================================================

/// REST client for the movement API.
pub struct HttpTransport {
    base_url: String,
    bearer: Option<String>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct IngestReply {
    batch_id: String,
}

#[derive(Deserialize)]
struct UpdatePositionReply {
    record_id: Option<Uuid>,
}

#[derive(serde::Serialize)]
struct IngestPayload<'a> {
    batch: &'a [BatchEntry],
}

#[derive(serde::Serialize)]
struct UpdatePositionPayload {
    position: Position,
}

impl HttpTransport {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer: None,
            client: reqwest::Client::new(),
        }
    }

    /// Attach a channel access token sent as a bearer credential.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let builder = self.client.request(method, url);
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Fetch the full movement record set once, outside the live feed. Used
    /// for catch-up by clients that poll instead of holding a socket.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` on a non-success status, `Http` on transport
    /// failure.
    pub async fn fetch_feed(&self, frame_id: Uuid) -> Result<Vec<MovementRecord>, TransportError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/frames/{frame_id}/movements"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::Rejected { status: response.status().as_u16() });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn ingest_batch(&self, frame_id: Uuid, batch: Vec<BatchEntry>) -> Result<String, TransportError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/api/frames/{frame_id}/movements"))
            .json(&IngestPayload { batch: &batch })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::Rejected { status: response.status().as_u16() });
        }
        let reply: IngestReply = response.json().await?;
        Ok(reply.batch_id)
    }

    async fn update_node_position(
        &self,
        frame_id: Uuid,
        render_id: &str,
        position: Position,
    ) -> Result<Option<Uuid>, TransportError> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/api/frames/{frame_id}/nodes/{render_id}/position"),
            )
            .json(&UpdatePositionPayload { position })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::Rejected { status: response.status().as_u16() });
        }
        let reply: UpdatePositionReply = response.json().await?;
        Ok(reply.record_id)
    }
}
