// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic sync trigger.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use livesync_config::model::SyncConfig;

use crate::store::SyncStatusStore;

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Calls [`SyncStatusStore::sync_now`] on a fixed period until cancelled.
pub struct SyncScheduler {
    store: SyncStatusStore,
    period: Duration,
}

impl SyncScheduler {
    /// A scheduler syncing every five minutes.
    pub fn new(store: SyncStatusStore) -> Self {
        Self::from_config(store, &SyncConfig::default())
    }

    pub fn from_config(store: SyncStatusStore, config: &SyncConfig) -> Self {
        Self {
            store,
            period: Duration::from_secs(config.interval_secs).max(MIN_PERIOD),
        }
    }

    /// Periods under one second are raised to one second.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period.max(MIN_PERIOD);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run on the current runtime. The first sync happens one period after
    /// start.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            info!(period_secs = self.period.as_secs(), "sync scheduler started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("sync scheduler stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.store.sync_now().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use livesync_core::LiveSyncError;

    use super::*;
    use crate::store::SyncTask;

    struct Noop;

    #[async_trait::async_trait]
    impl SyncTask for Noop {
        async fn sync(&self, _pending: usize) -> Result<(), LiveSyncError> {
            Ok(())
        }
    }

    #[test]
    fn zero_period_is_clamped() {
        let scheduler = SyncScheduler::new(SyncStatusStore::new(Arc::new(Noop))).with_period(Duration::ZERO);
        assert_eq!(scheduler.period(), Duration::from_secs(1));
    }

    #[test]
    fn zero_interval_in_config_is_clamped() {
        let config = SyncConfig { interval_secs: 0 };
        let scheduler = SyncScheduler::from_config(SyncStatusStore::new(Arc::new(Noop)), &config);
        assert_eq!(scheduler.period(), Duration::from_secs(1));
    }
}
