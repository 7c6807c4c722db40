// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock query fetcher for deterministic testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use livesync_core::{LiveSyncError, QueryFetcher, QueryKey};

#[derive(Default)]
struct Responses {
    values: HashMap<QueryKey, Value>,
    failures: HashMap<QueryKey, VecDeque<String>>,
    calls: Vec<QueryKey>,
}

/// A [`QueryFetcher`] answering from canned values.
///
/// Keys without a canned value resolve to `null`. Queued failures are
/// consumed before the canned value is returned. While paused, fetches
/// block until [`MockFetcher::resume`] is called.
pub struct MockFetcher {
    responses: Mutex<Responses>,
    paused: watch::Sender<bool>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            responses: Mutex::new(Responses::default()),
            paused,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Responses> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer `key` with `value` from now on.
    pub fn respond(&self, key: impl Into<QueryKey>, value: Value) {
        self.lock().values.insert(key.into(), value);
    }

    /// Fail the next `times` fetches of `key` with `message`.
    pub fn fail_next(&self, key: impl Into<QueryKey>, times: usize, message: &str) {
        let mut responses = self.lock();
        let queue = responses.failures.entry(key.into()).or_default();
        queue.extend(std::iter::repeat_n(message.to_string(), times));
    }

    /// Hold every fetch until [`MockFetcher::resume`].
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Number of fetches started for `key`.
    pub fn fetch_count(&self, key: &QueryKey) -> usize {
        self.lock().calls.iter().filter(|k| *k == key).count()
    }

    /// Number of fetches started for any key.
    pub fn total_fetches(&self) -> usize {
        self.lock().calls.len()
    }

    /// Fetches currently blocked or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of concurrent fetches observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }
}

#[async_trait]
impl QueryFetcher for MockFetcher {
    async fn fetch(&self, key: &QueryKey) -> Result<Value, LiveSyncError> {
        self.lock().calls.push(key.clone());
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);

        let mut paused = self.paused.subscribe();
        let _ = paused.wait_for(|p| !*p).await;

        let result = {
            let mut responses = self.lock();
            match responses.failures.get_mut(key).and_then(VecDeque::pop_front) {
                Some(message) => Err(LiveSyncError::Fetch {
                    key: key.to_string(),
                    message,
                }),
                None => Ok(responses.values.get(key).cloned().unwrap_or(Value::Null)),
            }
        };
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        result
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn returns_canned_value_and_counts_calls() {
        let fetcher = MockFetcher::new();
        let key = QueryKey::from("submissions");
        fetcher.respond(key.clone(), json!([{"id": "d1"}]));

        assert_eq!(fetcher.fetch(&key).await.unwrap(), json!([{"id": "d1"}]));
        assert_eq!(fetcher.fetch_count(&key), 1);
    }

    #[tokio::test]
    async fn queued_failures_come_first() {
        let fetcher = MockFetcher::new();
        let key = QueryKey::from("deals");
        fetcher.fail_next(key.clone(), 1, "boom");

        assert!(matches!(
            fetcher.fetch(&key).await,
            Err(LiveSyncError::Fetch { .. })
        ));
        assert_eq!(fetcher.fetch(&key).await.unwrap(), Value::Null);
    }
}
