// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query fetcher trait used to (re)load cached query results.

use async_trait::async_trait;

use crate::error::LiveSyncError;
use crate::query_key::QueryKey;

/// Loads the authoritative value for a query key from the backend.
#[async_trait]
pub trait QueryFetcher: Send + Sync + 'static {
    /// Fetches the current value for `key`.
    async fn fetch(&self, key: &QueryKey) -> Result<serde_json::Value, LiveSyncError>;
}
