//! Domain services used by HTTP routes and the feed socket.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on protocol translation and access plumbing.

pub mod frame;
pub mod movement;
pub mod persistence;
pub mod placement;
pub mod presence;
