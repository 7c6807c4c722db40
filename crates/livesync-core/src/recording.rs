// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! installed by the embedding application can collect these metrics.

use metrics::{describe_counter, describe_gauge};

/// Register all LiveSync metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "livesync_change_events_total",
        "Change events delivered to listeners"
    );
    describe_counter!(
        "livesync_invalidations_total",
        "Cached queries marked stale by change events"
    );
    describe_counter!(
        "livesync_patches_total",
        "Cached queries patched in place from change payloads"
    );
    describe_counter!(
        "livesync_notifications_total",
        "Notifications queued for display"
    );
    describe_gauge!("livesync_active_channels", "Currently joined realtime channels");
}

/// Record a change event delivered on `table`.
pub fn record_change_event(table: &str, operation: &str) {
    metrics::counter!(
        "livesync_change_events_total",
        "table" => table.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record cache invalidations.
pub fn record_invalidations(count: usize) {
    metrics::counter!("livesync_invalidations_total").increment(count as u64);
}

/// Record optimistic cache patches.
pub fn record_patches(count: usize) {
    metrics::counter!("livesync_patches_total").increment(count as u64);
}

/// Record a queued notification.
pub fn record_notification(kind: &str) {
    metrics::counter!("livesync_notifications_total", "kind" => kind.to_string()).increment(1);
}

/// Set the number of joined channels.
pub fn set_active_channels(count: usize) {
    metrics::gauge!("livesync_active_channels").set(count as f64);
}
