// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sync status store driven by connectivity and the scheduler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use livesync_core::LiveSyncError;
use livesync_status::{SyncPhase, SyncScheduler, SyncStatusStore, SyncTask};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct CountingTask {
    runs: AtomicUsize,
}

#[async_trait]
impl SyncTask for CountingTask {
    async fn sync(&self, _pending: usize) -> Result<(), LiveSyncError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn coming_back_online_with_pending_changes_syncs() {
    let task = Arc::new(CountingTask::default());
    let store = SyncStatusStore::new(task.clone());
    store.set_online(false);
    store.add_pending(4);

    assert!(!store.sync_now().await);
    assert_eq!(task.runs.load(Ordering::SeqCst), 0);

    store.set_online(true);
    settle().await;

    assert_eq!(task.runs.load(Ordering::SeqCst), 1);
    let status = store.status();
    assert_eq!(status.pending_changes, 0);
    assert_eq!(status.phase, SyncPhase::Idle);
}

#[tokio::test]
async fn coming_back_online_without_pending_changes_stays_idle() {
    let task = Arc::new(CountingTask::default());
    let store = SyncStatusStore::new(task.clone());
    store.set_online(false);
    store.set_online(true);
    settle().await;

    assert_eq!(task.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn scheduler_syncs_every_period_until_cancelled() {
    let task = Arc::new(CountingTask::default());
    let store = SyncStatusStore::new(task.clone());
    let cancel = CancellationToken::new();
    let handle = SyncScheduler::new(store.clone()).spawn(cancel.clone());

    tokio::time::sleep(Duration::from_secs(5 * 60 * 3 + 1)).await;
    assert_eq!(task.runs.load(Ordering::SeqCst), 3);

    cancel.cancel();
    handle.await.unwrap();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(task.runs.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn scheduler_ticks_are_skipped_while_offline() {
    let task = Arc::new(CountingTask::default());
    let store = SyncStatusStore::new(task.clone());
    store.set_online(false);
    let cancel = CancellationToken::new();
    let _handle = SyncScheduler::new(store.clone())
        .with_period(Duration::from_secs(10))
        .spawn(cancel.clone());

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(task.runs.load(Ordering::SeqCst), 0);
    cancel.cancel();
}
