// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `livesync watch` command implementation.
//!
//! Mounts the dashboard views against the configured realtime backend and
//! logs every notification they raise until shutdown.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use livesync_config::model::LiveSyncConfig;
use livesync_core::LiveSyncError;
use livesync_phoenix::PhoenixTransport;
use livesync_views::LiveSync;

use crate::offline::OfflineFetcher;

/// Run the `livesync watch` command.
pub async fn run_watch(
    config: LiveSyncConfig,
    user: Option<&str>,
    cancel: CancellationToken,
) -> Result<(), LiveSyncError> {
    if !config.realtime_enabled() {
        return Err(LiveSyncError::Config(
            "realtime is disabled; set USE_SUPABASE=true and realtime.features.submissions".into(),
        ));
    }
    let transport = Arc::new(PhoenixTransport::from_config(&config.realtime)?);
    let sync = LiveSync::new(config, transport.clone(), Arc::new(OfflineFetcher));

    let seen = watch_views(&sync, user, cancel).await?;
    transport.disconnect();
    info!(notifications = seen, "watch stopped");
    Ok(())
}

/// Mount the session's views and log notifications until `cancel` fires.
///
/// Returns how many notifications were logged.
pub async fn watch_views(
    sync: &LiveSync,
    user: Option<&str>,
    cancel: CancellationToken,
) -> Result<usize, LiveSyncError> {
    let mut notifications = sync.notifications().subscribe();

    let mut views = vec![sync.watch_submissions()?, sync.watch_deals()?];
    if let Some(user) = user {
        views.push(sync.watch_user_submissions(user)?);
    }
    views.extend(sync.watch_configured_routes()?);
    info!(
        live = views.iter().filter(|v| v.is_live()).count(),
        mounted = views.len(),
        "watching for changes"
    );

    let mut seen = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = notifications.recv() => match received {
                Ok(n) => {
                    seen += 1;
                    info!(
                        kind = %n.kind,
                        title = %n.title,
                        entity = n.entity_id.as_deref().unwrap_or("-"),
                        "{}",
                        n.message
                    );
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notification log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    drop(views);
    sync.shutdown();
    Ok(seen)
}
