//! Access-control seam for frame operations.
//!
//! ARCHITECTURE
//! ============
//! Batch ingest and the movement feed both require access to the frame's
//! parent channel. The check is delegated to an `AccessControl` collaborator
//! so the sync engine and batch store stay independent of how identity is
//! established. Two implementations ship: `OpenAccess` (development default,
//! every caller is granted) and `ChannelTokenAccess` (bearer token hashed and
//! compared against the channel's stored token hash).
//!
//! TRADE-OFFS
//! ==========
//! Tokens are stored hashed, never plaintext; a lost token cannot be
//! recovered, only rotated. Channels without a token hash are open.

use std::fmt::Write;

use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("caller lacks access to frame {0}")]
    Unauthorized(Uuid),
    #[error("frame not found: {0}")]
    FrameNotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Identity granted by a successful access check. Anonymous (nil id) under
/// open access; stable per credential under token access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
}

impl Principal {
    #[must_use]
    pub fn anonymous() -> Self {
        Self { id: Uuid::nil() }
    }
}

/// Collaborator consulted before any frame-scoped operation.
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Grant or deny access to a frame for the presented credential.
    ///
    /// # Errors
    ///
    /// `Unauthorized` when the credential does not open the frame's channel,
    /// `FrameNotFound` when the frame does not exist.
    async fn require_frame_access(&self, frame_id: Uuid, credential: Option<&str>) -> Result<Principal, AccessError>;
}

// =============================================================================
// TOKEN HELPERS
// =============================================================================

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex access token.
#[must_use]
pub fn generate_access_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// SHA-256 hex digest of a token, the form stored on the channel row.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    bytes_to_hex(&digest)
}

/// Derive a stable principal id from a credential.
fn principal_from_token(token: &str) -> Principal {
    let digest = Sha256::digest(token.as_bytes());
    let id = Uuid::from_slice(&digest[..16]).unwrap_or(Uuid::nil());
    Principal { id }
}

// =============================================================================
// OPEN ACCESS
// =============================================================================

/// Grants every caller. Used when no access token scheme is configured.
pub struct OpenAccess;

#[async_trait]
impl AccessControl for OpenAccess {
    async fn require_frame_access(&self, _frame_id: Uuid, _credential: Option<&str>) -> Result<Principal, AccessError> {
        Ok(Principal::anonymous())
    }
}

// =============================================================================
// CHANNEL TOKEN ACCESS
// =============================================================================

/// Bearer-token check against the frame's parent channel. Channels created
/// without a token remain open to everyone.
pub struct ChannelTokenAccess {
    pool: PgPool,
}

impl ChannelTokenAccess {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessControl for ChannelTokenAccess {
    async fn require_frame_access(&self, frame_id: Uuid, credential: Option<&str>) -> Result<Principal, AccessError> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT c.access_token_hash
             FROM frames f
             JOIN channels c ON c.id = f.channel_id
             WHERE f.id = $1",
        )
        .bind(frame_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((stored_hash,)) = row else {
            return Err(AccessError::FrameNotFound(frame_id));
        };

        let Some(stored_hash) = stored_hash else {
            // Channel was created without a token.
            return Ok(Principal::anonymous());
        };

        let Some(token) = credential else {
            return Err(AccessError::Unauthorized(frame_id));
        };

        if hash_token(token) == stored_hash {
            Ok(principal_from_token(token))
        } else {
            Err(AccessError::Unauthorized(frame_id))
        }
    }
}

#[cfg(test)]
#[path = "access_test.rs"]
mod tests;
