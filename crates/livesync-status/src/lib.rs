// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sync status tracking for offline-capable feature areas.
//!
//! [`SyncStatusStore`] runs the `IDLE -> SYNCING -> SUCCESS|ERROR -> IDLE`
//! cycle, gated on connectivity, and notifies registered listeners
//! synchronously on every change. [`SyncScheduler`] triggers it
//! periodically.

pub mod scheduler;
pub mod store;

pub use scheduler::SyncScheduler;
pub use store::{ListenerId, SyncPhase, SyncStatus, SyncStatusStore, SyncTask};
