// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Presence tracking for LiveSync.
//!
//! A client asserts its own [`PresenceRecord`] into a global roster or a
//! per-entity roster and reads everyone else's. Rosters are derived from the
//! backend's `sync`/`join`/`leave` traffic and never include the client
//! itself.
//!
//! [`PresenceRecord`]: livesync_core::PresenceRecord

pub mod roster;
pub mod tracker;

pub use roster::Roster;
pub use tracker::{PresenceHandle, PresenceTracker};
