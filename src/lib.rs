//! Position synchronization for a collaborative visual canvas.
//!
//! ARCHITECTURE
//! ============
//! Multiple users drag nodes around a shared frame; this crate keeps every
//! participant's view of node positions eventually consistent with nothing
//! stronger than last-write-wins storage. The server side (`routes`,
//! `services`, `state`) ingests movement batches, stores the latest batch
//! per (frame, node) pair, and re-delivers the full record set to every
//! feed subscriber. The client side (`sync`) buffers drag gestures, picks
//! between debounced solo writes and timed batch flushes based on presence,
//! suppresses its own echoes, and replays remote batches with a stagger so
//! a peer's drag animates instead of teleporting.
//!
//! The binary in `main.rs` runs the server; the `sync` module is the
//! embeddable client engine.

pub mod access;
pub mod db;
pub mod routes;
pub mod services;
pub mod state;
pub mod sync;
pub mod wire;
