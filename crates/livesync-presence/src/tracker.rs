// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asserting this client's presence and following everyone else's.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use livesync_config::model::PresenceConfig;
use livesync_core::{LiveSyncError, PresenceRecord, PresenceScope, SubscriptionState};
use livesync_feed::{RealtimeClient, Subscription};

use crate::roster::Roster;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Opens presence channels on a [`RealtimeClient`].
#[derive(Clone)]
pub struct PresenceTracker {
    client: RealtimeClient,
    heartbeat: Duration,
}

impl PresenceTracker {
    /// A tracker re-asserting records every 30 seconds.
    pub fn new(client: RealtimeClient) -> Self {
        Self::from_config(client, &PresenceConfig::default())
    }

    pub fn from_config(client: RealtimeClient, config: &PresenceConfig) -> Self {
        Self {
            client,
            heartbeat: Duration::from_secs(config.heartbeat_secs.max(1)),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Assert `record` into the roster for `scope`.
    ///
    /// The returned handle keeps the record asserted, re-sending it with a
    /// fresh `last_seen` on every heartbeat, and removes it when dropped.
    pub fn track(
        &self,
        scope: PresenceScope,
        record: PresenceRecord,
    ) -> Result<PresenceHandle, LiveSyncError> {
        let (roster_tx, roster_rx) = watch::channel(Vec::new());
        let roster = Arc::new(Mutex::new(Roster::new(record.user_id.clone())));

        let listener_roster = Arc::clone(&roster);
        let subscription = self
            .client
            .channel(scope.topic())
            .presence_key(record.user_id.clone())
            .on_presence(move |message| {
                let others = {
                    let mut roster = lock(&listener_roster);
                    roster.apply(message);
                    roster.others()
                };
                roster_tx.send_replace(others);
            })
            .independent()
            .subscribe()?;
        let subscription = Arc::new(subscription);

        let record = Arc::new(Mutex::new(record));
        subscription.track(lock(&record).clone())?;

        let cancel = CancellationToken::new();
        tokio::spawn(heartbeat(
            Arc::clone(&subscription),
            Arc::clone(&record),
            self.heartbeat,
            cancel.clone(),
        ));

        info!(scope = %scope, user = %lock(&record).user_id, "presence tracked");
        Ok(PresenceHandle {
            scope,
            subscription,
            record,
            roster,
            roster_rx,
            cancel,
            untracked: AtomicBool::new(false),
        })
    }
}

async fn heartbeat(
    subscription: Arc<Subscription>,
    record: Arc<Mutex<PresenceRecord>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if subscription.state() != SubscriptionState::Subscribed {
                    continue;
                }
                let refreshed = {
                    let mut record = lock(&record);
                    record.last_seen = Utc::now();
                    record.clone()
                };
                if let Err(e) = subscription.track(refreshed) {
                    debug!(channel = %subscription.channel_id(), error = %e, "presence heartbeat skipped");
                }
            }
        }
    }
}

/// This client's presence in one scope.
pub struct PresenceHandle {
    scope: PresenceScope,
    subscription: Arc<Subscription>,
    record: Arc<Mutex<PresenceRecord>>,
    roster: Arc<Mutex<Roster>>,
    roster_rx: watch::Receiver<Vec<PresenceRecord>>,
    cancel: CancellationToken,
    untracked: AtomicBool,
}

impl PresenceHandle {
    pub fn scope(&self) -> &PresenceScope {
        &self.scope
    }

    pub fn state(&self) -> SubscriptionState {
        self.subscription.state()
    }

    /// The record currently asserted.
    pub fn record(&self) -> PresenceRecord {
        lock(&self.record).clone()
    }

    /// Everyone else present in this scope.
    pub fn others(&self) -> Vec<PresenceRecord> {
        lock(&self.roster).others()
    }

    /// Peers in this scope viewing `entity_id`.
    pub fn viewing(&self, entity_id: &str) -> Vec<PresenceRecord> {
        lock(&self.roster).viewing(entity_id)
    }

    /// Follow roster changes.
    pub fn watch(&self) -> watch::Receiver<Vec<PresenceRecord>> {
        self.roster_rx.clone()
    }

    /// Change the asserted record and re-assert it immediately.
    pub fn update<F>(&self, change: F) -> Result<(), LiveSyncError>
    where
        F: FnOnce(&mut PresenceRecord),
    {
        let updated = {
            let mut record = lock(&self.record);
            change(&mut record);
            record.last_seen = Utc::now();
            record.clone()
        };
        self.subscription.track(updated)
    }

    pub fn set_page(&self, page: impl Into<String>) -> Result<(), LiveSyncError> {
        let page = page.into();
        self.update(|record| record.current_page = Some(page))
    }

    pub fn set_viewing(&self, entity_id: Option<String>) -> Result<(), LiveSyncError> {
        self.update(|record| record.viewing_entity_id = entity_id)
    }

    /// Remove this client's record and leave the channel. Calling it again
    /// is a no-op.
    pub fn untrack(&self) {
        if self.untracked.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        if let Err(e) = self.subscription.untrack() {
            debug!(scope = %self.scope, error = %e, "untrack not delivered; leaving channel");
        }
        self.subscription.close();
        info!(scope = %self.scope, "presence untracked");
    }
}

impl Drop for PresenceHandle {
    fn drop(&mut self) {
        self.untrack();
    }
}

impl std::fmt::Debug for PresenceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceHandle")
            .field("scope", &self.scope)
            .field("others", &self.others().len())
            .finish()
    }
}
