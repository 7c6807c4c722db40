// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;
use serde_json::Value;

use livesync_core::{LiveSyncError, QueryFetcher, QueryKey};

/// Fetcher for sessions without a query backend. Every refetch fails, so
/// invalidated entries stay stale.
pub struct OfflineFetcher;

#[async_trait]
impl QueryFetcher for OfflineFetcher {
    async fn fetch(&self, key: &QueryKey) -> Result<Value, LiveSyncError> {
        Err(LiveSyncError::Fetch {
            key: key.to_string(),
            message: "no query backend in this session".into(),
        })
    }
}
