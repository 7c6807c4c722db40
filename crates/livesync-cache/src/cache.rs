// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed query results with staleness tracking.
//!
//! Every mutation here is synchronous and completes under the entry's map
//! lock. Refetch bookkeeping guarantees at most one fetch in flight per key:
//! an invalidation that lands while a fetch is running is remembered and
//! turned into exactly one follow-up fetch when the running one completes.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use strum::Display;
use tokio::sync::broadcast;

use livesync_core::{QueryKey, Timestamp};

/// Freshness of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Staleness {
    Fresh,
    Stale,
    Refetching,
}

/// A point-in-time copy of one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuery {
    pub key: QueryKey,
    pub data: Option<Value>,
    pub staleness: Staleness,
    pub last_fetched_at: Option<Timestamp>,
    /// Message of the last failed refetch, cleared by the next success.
    pub error: Option<String>,
}

/// Result of handing a finished fetch back to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchOutcome {
    /// Data stored, entry is fresh.
    Stored,
    /// Data stored, but the entry was invalidated mid-fetch and needs one
    /// more fetch.
    FollowUp,
    /// Nobody observes the key any more; the data was dropped.
    Discarded,
    /// The fetch failed; the entry stays stale with the error recorded.
    Failed,
}

#[derive(Debug)]
struct Entry {
    data: Option<Value>,
    staleness: Staleness,
    last_fetched_at: Option<Timestamp>,
    error: Option<String>,
    observers: usize,
    invalidated_during_fetch: bool,
}

impl Entry {
    fn empty() -> Self {
        Self {
            data: None,
            staleness: Staleness::Stale,
            last_fetched_at: None,
            error: None,
            observers: 0,
            invalidated_during_fetch: false,
        }
    }

    fn snapshot(&self, key: &QueryKey) -> CachedQuery {
        CachedQuery {
            key: key.clone(),
            data: self.data.clone(),
            staleness: self.staleness,
            last_fetched_at: self.last_fetched_at,
            error: self.error.clone(),
        }
    }
}

/// In-memory query cache shared by views, the query client and the router.
pub struct QueryCache {
    entries: DashMap<QueryKey, Entry>,
    changes: broadcast::Sender<QueryKey>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            entries: DashMap::new(),
            changes,
        }
    }

    /// Receive the key of every entry that changed.
    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.changes.subscribe()
    }

    fn notify(&self, key: &QueryKey) {
        let _ = self.changes.send(key.clone());
    }

    pub fn get(&self, key: &QueryKey) -> Option<CachedQuery> {
        self.entries.get(key).map(|entry| entry.snapshot(key))
    }

    /// The cached value if the entry is fresh.
    pub fn fresh_data(&self, key: &QueryKey) -> Option<Value> {
        self.entries
            .get(key)
            .filter(|entry| entry.staleness == Staleness::Fresh)
            .and_then(|entry| entry.data.clone())
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn observers(&self, key: &QueryKey) -> usize {
        self.entries.get(key).map_or(0, |entry| entry.observers)
    }

    /// Write `value` as the fresh result for `key`, creating the entry if
    /// needed.
    pub fn set_query_data(&self, key: QueryKey, value: Value) {
        {
            let mut entry = self.entries.entry(key.clone()).or_insert_with(Entry::empty);
            entry.data = Some(value);
            entry.last_fetched_at = Some(Utc::now());
            entry.error = None;
            if entry.staleness != Staleness::Refetching {
                entry.staleness = Staleness::Fresh;
            }
        }
        self.notify(&key);
    }

    /// Rewrite the cached value of `key` in place.
    ///
    /// Returns `false` without calling `updater` when the key holds no data.
    /// Staleness is left unchanged.
    pub fn update_query_data<F>(&self, key: &QueryKey, updater: F) -> bool
    where
        F: FnOnce(&Value) -> Value,
    {
        let updated = match self.entries.get_mut(key) {
            Some(mut entry) => match entry.data.as_ref() {
                Some(current) => {
                    let next = updater(current);
                    entry.data = Some(next);
                    true
                }
                None => false,
            },
            None => false,
        };
        if updated {
            self.notify(key);
        }
        updated
    }

    /// Mark every entry under `prefix` stale.
    ///
    /// Entries already stale are left alone; entries being refetched get
    /// a follow-up fetch flagged. Returns the matching keys.
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut matched = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if !entry.key().starts_with(prefix) {
                continue;
            }
            match entry.staleness {
                Staleness::Fresh => entry.staleness = Staleness::Stale,
                Staleness::Refetching => entry.invalidated_during_fetch = true,
                Staleness::Stale => {}
            }
            matched.push(entry.key().clone());
        }
        matched.sort();
        for key in &matched {
            self.notify(key);
        }
        matched
    }

    /// Claim the right to fetch `key`.
    ///
    /// Succeeds for absent and stale entries, moving them to
    /// [`Staleness::Refetching`]. Fails while another fetch is in flight or
    /// when the entry is fresh.
    pub fn begin_refetch(&self, key: &QueryKey) -> bool {
        let mut entry = self.entries.entry(key.clone()).or_insert_with(Entry::empty);
        if entry.staleness == Staleness::Stale {
            entry.staleness = Staleness::Refetching;
            entry.invalidated_during_fetch = false;
            true
        } else {
            false
        }
    }

    /// Hand a finished fetch back to the cache.
    pub fn complete_refetch(&self, key: &QueryKey, result: Result<Value, String>) -> RefetchOutcome {
        let outcome = {
            let Some(mut entry) = self.entries.get_mut(key) else {
                return RefetchOutcome::Discarded;
            };
            let follow_up = std::mem::take(&mut entry.invalidated_during_fetch);
            match result {
                Err(message) => {
                    entry.staleness = Staleness::Stale;
                    entry.error = Some(message);
                    RefetchOutcome::Failed
                }
                Ok(_) if entry.observers == 0 => {
                    entry.staleness = Staleness::Stale;
                    RefetchOutcome::Discarded
                }
                Ok(value) => {
                    entry.data = Some(value);
                    entry.last_fetched_at = Some(Utc::now());
                    entry.error = None;
                    if follow_up {
                        entry.staleness = Staleness::Stale;
                        RefetchOutcome::FollowUp
                    } else {
                        entry.staleness = Staleness::Fresh;
                        RefetchOutcome::Stored
                    }
                }
            }
        };
        self.notify(key);
        outcome
    }

    /// Register interest in `key` for the lifetime of the returned guard.
    ///
    /// Observed stale entries are refetched when invalidated; refetch
    /// results for unobserved keys are dropped.
    pub fn observe(self: &Arc<Self>, key: QueryKey) -> ObserverGuard {
        self.entries
            .entry(key.clone())
            .or_insert_with(Entry::empty)
            .observers += 1;
        ObserverGuard {
            cache: Arc::clone(self),
            key,
        }
    }

    pub fn remove(&self, key: &QueryKey) -> Option<CachedQuery> {
        self.entries
            .remove(key)
            .map(|(key, entry)| entry.snapshot(&key))
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Keeps a query key observed until dropped.
pub struct ObserverGuard {
    cache: Arc<QueryCache>,
    key: QueryKey,
}

impl ObserverGuard {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(mut entry) = self.cache.entries.get_mut(&self.key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }
}

impl std::fmt::Debug for ObserverGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverGuard").field("key", &self.key).finish()
    }
}
