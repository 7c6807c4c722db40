// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The sync status state machine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use strum::Display;
use tracing::{debug, info, warn};

use livesync_core::{LiveSyncError, Timestamp};

/// Where the sync cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    Idle,
    Syncing,
    Success,
    Error,
}

/// Snapshot handed to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub is_online: bool,
    pub last_sync_at: Option<Timestamp>,
    pub sync_error: Option<String>,
    pub pending_changes: usize,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            is_online: true,
            last_sync_at: None,
            sync_error: None,
            pending_changes: 0,
        }
    }
}

/// The work performed by one sync cycle.
#[async_trait]
pub trait SyncTask: Send + Sync + 'static {
    /// Push `pending` local changes and pull remote ones.
    async fn sync(&self, pending: usize) -> Result<(), LiveSyncError>;
}

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

struct Shared {
    status: Mutex<SyncStatus>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    task: Arc<dyn SyncTask>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Connectivity and sync progress for one feature area.
///
/// Cheap to clone; clones share state and listeners.
#[derive(Clone)]
pub struct SyncStatusStore {
    shared: Arc<Shared>,
}

impl SyncStatusStore {
    pub fn new(task: Arc<dyn SyncTask>) -> Self {
        Self {
            shared: Arc::new(Shared {
                status: Mutex::new(SyncStatus::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                task,
            }),
        }
    }

    pub fn status(&self) -> SyncStatus {
        lock(&self.shared.status).clone()
    }

    /// Register a listener called after every mutation.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        let id = self.shared.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.shared.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Apply `change` and notify listeners with the resulting snapshot.
    fn mutate<R>(&self, change: impl FnOnce(&mut SyncStatus) -> R) -> R {
        let (result, snapshot) = {
            let mut status = lock(&self.shared.status);
            let result = change(&mut status);
            (result, status.clone())
        };
        let listeners: Vec<Listener> = lock(&self.shared.listeners)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
        result
    }

    /// Record a connectivity change.
    ///
    /// Coming back online with pending changes starts a sync in the
    /// background.
    pub fn set_online(&self, online: bool) {
        let resync = self.mutate(|status| {
            let came_back = online && !status.is_online;
            status.is_online = online;
            came_back && status.pending_changes > 0
        });
        info!(online, "connectivity changed");
        if resync {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let store = self.clone();
                    runtime.spawn(async move {
                        store.sync_now().await;
                    });
                }
                Err(_) => debug!("no runtime; pending changes sync on the next tick"),
            }
        }
    }

    /// Record `count` more local changes waiting to be synced.
    pub fn add_pending(&self, count: usize) {
        self.mutate(|status| status.pending_changes += count);
    }

    pub fn set_pending(&self, count: usize) {
        self.mutate(|status| status.pending_changes = count);
    }

    /// Run one sync cycle.
    ///
    /// A silent no-op returning `false` while offline or while a cycle is
    /// already running.
    pub async fn sync_now(&self) -> bool {
        let pending = self.mutate(|status| {
            if !status.is_online || status.phase != SyncPhase::Idle {
                return None;
            }
            status.phase = SyncPhase::Syncing;
            Some(status.pending_changes)
        });
        let Some(pending) = pending else {
            debug!("sync skipped: offline or already syncing");
            return false;
        };

        let result = self.shared.task.sync(pending).await;
        match &result {
            Ok(()) => debug!(pending, "sync succeeded"),
            Err(e) => warn!(error = %e, "sync failed"),
        }

        self.mutate(|status| match result {
            Ok(()) => {
                status.phase = SyncPhase::Success;
                status.last_sync_at = Some(Utc::now());
                status.sync_error = None;
                status.pending_changes = status.pending_changes.saturating_sub(pending);
            }
            Err(e) => {
                status.phase = SyncPhase::Error;
                status.sync_error = Some(e.to_string());
            }
        });
        self.mutate(|status| status.phase = SyncPhase::Idle);
        true
    }
}

impl std::fmt::Debug for SyncStatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStatusStore")
            .field("status", &self.status())
            .finish()
    }
}
