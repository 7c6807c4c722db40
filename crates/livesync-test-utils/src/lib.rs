// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for LiveSync integration tests.
//!
//! Provides an in-memory backend and mock collaborators for fast,
//! deterministic, CI-runnable tests without a realtime server.
//!
//! # Components
//!
//! - [`MemoryBackend`] - Realtime transport with server-side filtering,
//!   presence rosters and scripted join replies
//! - [`MockFetcher`] - Query fetcher with canned responses and call counting
//! - [`RecordingSink`] - Change sink that captures routed events
//! - [`wait_until`] - Poll a condition while background tasks make progress

pub mod memory_backend;
pub mod mock_fetcher;
pub mod recording_sink;

pub use memory_backend::{JoinReply, MemoryBackend};
pub use mock_fetcher::MockFetcher;
pub use recording_sink::{RecordedChange, RecordingSink};

use std::time::Duration;

/// Poll `condition` every few milliseconds for up to two seconds.
///
/// Returns whether the condition became true.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
