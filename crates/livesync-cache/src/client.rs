// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query client: reads through the cache and refetches stale entries.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use livesync_config::model::CacheConfig;
use livesync_core::{recording, LiveSyncError, QueryFetcher, QueryKey};

use crate::cache::{CachedQuery, ObserverGuard, QueryCache, RefetchOutcome, Staleness};

/// Pairs a [`QueryCache`] with the [`QueryFetcher`] that fills it.
#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<QueryCache>,
    fetcher: Arc<dyn QueryFetcher>,
    retries: u32,
}

impl QueryClient {
    /// A client that retries a failed fetch once.
    pub fn new(cache: Arc<QueryCache>, fetcher: Arc<dyn QueryFetcher>) -> Self {
        Self {
            cache,
            fetcher,
            retries: CacheConfig::default().refetch_retries,
        }
    }

    pub fn from_config(
        cache: Arc<QueryCache>,
        fetcher: Arc<dyn QueryFetcher>,
        config: &CacheConfig,
    ) -> Self {
        Self::new(cache, fetcher).with_retries(config.refetch_retries)
    }

    /// Extra attempts after a failed fetch. Retries run back to back.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Keep `key` observed while the guard lives.
    pub fn observe(&self, key: QueryKey) -> ObserverGuard {
        self.cache.observe(key)
    }

    /// Resolve `key`, fetching unless a fresh value is cached.
    ///
    /// Concurrent callers share one in-flight fetch.
    pub async fn fetch_query(&self, key: &QueryKey) -> Result<Value, LiveSyncError> {
        let _observer = self.cache.observe(key.clone());
        let mut changes = self.cache.subscribe();
        loop {
            if let Some(data) = self.cache.fresh_data(key) {
                return Ok(data);
            }
            if self.cache.begin_refetch(key) {
                return self.run_fetch(key).await;
            }
            // Another fetch owns the key; wait for it to land.
            loop {
                match changes.recv().await {
                    Ok(changed) if changed == *key => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(_)) => break,
                    Err(RecvError::Closed) => {
                        return Err(LiveSyncError::Internal("query cache dropped".into()));
                    }
                }
            }
        }
    }

    /// Synchronous read of the cached entry.
    ///
    /// A stale entry is returned as-is and a background refetch is started
    /// for it, so a failed refetch is retried on the next read.
    pub fn read(&self, key: &QueryKey) -> Option<CachedQuery> {
        let entry = self.cache.get(key)?;
        if entry.staleness == Staleness::Stale {
            self.refetch_in_background(key.clone());
        }
        Some(entry)
    }

    /// Mark everything under `prefix` stale and refetch the observed keys.
    pub fn invalidate(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let keys = self.cache.invalidate_queries(prefix);
        recording::record_invalidations(keys.len());
        for key in &keys {
            if self.cache.observers(key) > 0 {
                self.refetch_in_background(key.clone());
            }
        }
        keys
    }

    /// Start a refetch of `key` on the runtime unless one is in flight.
    pub fn refetch_in_background(&self, key: QueryKey) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %key, "no runtime for background refetch; entry stays stale");
            return;
        };
        if !self.cache.begin_refetch(&key) {
            return;
        }
        let client = self.clone();
        runtime.spawn(async move {
            let _ = client.run_fetch(&key).await;
        });
    }

    /// Fetch `key` after a successful [`QueryCache::begin_refetch`], then
    /// run the single follow-up fetch if it was invalidated meanwhile.
    async fn run_fetch(&self, key: &QueryKey) -> Result<Value, LiveSyncError> {
        loop {
            let result = self.fetch_with_retries(key).await;
            let stored = result
                .as_ref()
                .map(Value::clone)
                .map_err(|e| e.to_string());
            match self.cache.complete_refetch(key, stored) {
                RefetchOutcome::FollowUp => {
                    debug!(key = %key, "invalidated during fetch; fetching again");
                    if !self.cache.begin_refetch(key) {
                        return result;
                    }
                }
                RefetchOutcome::Discarded => {
                    debug!(key = %key, "no observers left; refetch result discarded");
                    return result;
                }
                RefetchOutcome::Stored | RefetchOutcome::Failed => return result,
            }
        }
    }

    async fn fetch_with_retries(&self, key: &QueryKey) -> Result<Value, LiveSyncError> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch(key).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    debug!(key = %key, attempt, error = %e, "fetch failed; retrying");
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "fetch failed; entry left stale");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use livesync_test_utils::MockFetcher;
    use serde_json::json;

    use super::*;

    fn setup() -> (Arc<MockFetcher>, QueryClient) {
        let fetcher = Arc::new(MockFetcher::new());
        let client = QueryClient::new(Arc::new(QueryCache::new()), fetcher.clone());
        (fetcher, client)
    }

    #[tokio::test]
    async fn fetch_query_caches_result() {
        let (fetcher, client) = setup();
        let key = QueryKey::from("submissions");
        fetcher.respond(key.clone(), json!([{"id": "d1"}]));

        assert_eq!(client.fetch_query(&key).await.unwrap(), json!([{"id": "d1"}]));
        assert_eq!(client.fetch_query(&key).await.unwrap(), json!([{"id": "d1"}]));
        assert_eq!(fetcher.fetch_count(&key), 1);
        assert_eq!(
            client.cache().get(&key).unwrap().staleness,
            Staleness::Fresh
        );
    }

    #[tokio::test]
    async fn one_retry_by_default() {
        let (fetcher, client) = setup();
        let key = QueryKey::from("deals");
        fetcher.fail_next(key.clone(), 1, "flaky");
        fetcher.respond(key.clone(), json!([]));

        assert_eq!(client.fetch_query(&key).await.unwrap(), json!([]));
        assert_eq!(fetcher.fetch_count(&key), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_record_error() {
        let (fetcher, client) = setup();
        let key = QueryKey::from("deals");
        fetcher.fail_next(key.clone(), 2, "down");

        assert!(client.fetch_query(&key).await.is_err());
        let entry = client.cache().get(&key).unwrap();
        assert_eq!(entry.staleness, Staleness::Stale);
        assert!(entry.error.unwrap().contains("down"));
    }
}
