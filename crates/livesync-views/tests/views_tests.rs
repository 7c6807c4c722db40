// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dashboard scenarios end to end over the in-memory backend.

use std::sync::Arc;

use livesync_cache::Staleness;
use livesync_config::{LiveSyncConfig, RouteConfig};
use livesync_core::{
    ChangeEvent, ChannelStatus, LiveSyncError, PresenceRecord, PresenceScope, QueryKey, Row,
    SubscriptionState,
};
use livesync_notify::NotificationKind;
use livesync_test_utils::{wait_until, MemoryBackend, MockFetcher};
use livesync_views::LiveSync;
use serde_json::{json, Value};

fn row(value: Value) -> Row {
    value.as_object().cloned().expect("object")
}

fn enabled() -> LiveSyncConfig {
    let mut config = LiveSyncConfig::default();
    config.realtime.use_supabase = true;
    config
}

fn live(backend: &MemoryBackend, config: LiveSyncConfig) -> LiveSync {
    LiveSync::new(config, Arc::new(backend.clone()), Arc::new(MockFetcher::new()))
}

#[tokio::test]
async fn unfiltered_insert_marks_list_stale_and_queues_new_submission() {
    let backend = MemoryBackend::new();
    let sync = live(&backend, enabled());
    let list = QueryKey::from("submissions");
    sync.queries().cache().set_query_data(list.clone(), json!([]));

    let view = sync.watch_submissions().unwrap();
    view.subscription().unwrap().subscribed().await.unwrap();

    let delivered = backend.emit_change(ChangeEvent::insert(
        "deals",
        row(json!({"id": "d1", "contact_name": "Ada Lovelace", "owner_id": "U1"})),
    ));
    assert_eq!(delivered, 1);

    assert!(wait_until(|| sync.notifications().len() == 1).await);
    let notification = &sync.notifications().list()[0];
    assert_eq!(notification.kind, NotificationKind::Info);
    assert_eq!(notification.title, "New Submission");
    assert_eq!(notification.message, "New submission from Ada Lovelace");
    assert_eq!(
        sync.queries().cache().get(&list).unwrap().staleness,
        Staleness::Stale
    );
}

#[tokio::test]
async fn owner_filtered_update_notifies_and_skips_other_owners() {
    let backend = MemoryBackend::new();
    let sync = live(&backend, enabled());
    let cache = sync.queries().cache();
    let mine = QueryKey::root("userSubmissions").with("U1");
    let detail = QueryKey::root("submission").with("d1");
    cache.set_query_data(mine.clone(), json!([{"id": "d1"}]));
    cache.set_query_data(detail.clone(), json!({"id": "d1", "status": "open"}));

    let view = sync.watch_user_submissions("U1").unwrap();
    view.subscription().unwrap().subscribed().await.unwrap();

    let after = json!({"id": "d1", "owner_id": "U1", "name": "Globex", "status": "won"});
    let delivered = backend.emit_change(ChangeEvent::update(
        "deals",
        row(json!({"id": "d1", "owner_id": "U1", "name": "Globex", "status": "open"})),
        row(after.clone()),
    ));
    assert_eq!(delivered, 1);

    assert!(wait_until(|| sync.notifications().len() == 1).await);
    let notification = &sync.notifications().list()[0];
    assert_eq!(notification.kind, NotificationKind::Success);
    assert_eq!(notification.title, "Your Lead Updated");
    assert_eq!(notification.message, "Globex moved open → won");
    assert_eq!(cache.get(&mine).unwrap().staleness, Staleness::Stale);
    assert_eq!(cache.get(&detail).unwrap().data, Some(after));

    let other = backend.emit_change(ChangeEvent::update(
        "deals",
        row(json!({"id": "d2", "owner_id": "U2", "status": "open"})),
        row(json!({"id": "d2", "owner_id": "U2", "status": "won"})),
    ));
    assert_eq!(other, 0);
    assert_eq!(sync.notifications().len(), 1);
}

#[tokio::test]
async fn presence_peers_see_each_other_until_one_leaves() {
    let backend = MemoryBackend::new();
    let a = live(&backend, enabled());
    let b = live(&backend, enabled());
    let scope = PresenceScope::Entity("e1".into());

    let a_view = a
        .track_presence(scope.clone(), PresenceRecord::new("A", "alice"))
        .unwrap();
    let b_view = b
        .track_presence(scope, PresenceRecord::new("B", "bob"))
        .unwrap();

    assert!(wait_until(|| a_view.others().len() == 1 && b_view.others().len() == 1).await);
    assert_eq!(a_view.others()[0].user_id, "B");
    assert_eq!(b_view.others()[0].user_id, "A");

    drop(b_view);
    assert!(wait_until(|| a_view.others().is_empty()).await);
}

#[tokio::test]
async fn disabled_realtime_mounts_inert_views() {
    let backend = MemoryBackend::new();
    let sync = live(&backend, LiveSyncConfig::default());

    let view = sync.watch_submissions().unwrap();
    let presence = sync
        .track_presence(PresenceScope::Global, PresenceRecord::new("A", "alice"))
        .unwrap();

    assert!(!view.is_live());
    assert_eq!(view.state(), SubscriptionState::Closed);
    assert!(!presence.is_live());
    assert!(presence.others().is_empty());
    assert_eq!(backend.join_count("submissions-changes"), 0);
    assert!(sync.realtime().active_channels().is_empty());
}

#[tokio::test]
async fn feature_flags_gate_individual_views() {
    let backend = MemoryBackend::new();
    let mut config = enabled();
    config.realtime.features.deals = false;
    let sync = live(&backend, config);

    let deals = sync.watch_deals().unwrap();
    let submissions = sync.watch_submissions().unwrap();

    assert!(!deals.is_live());
    assert!(submissions.is_live());
    assert_eq!(sync.realtime().active_channels(), ["submissions-changes"]);
}

#[tokio::test]
async fn dropping_a_view_leaves_the_channel() {
    let backend = MemoryBackend::new();
    let sync = live(&backend, enabled());
    let view = sync.watch_deals().unwrap();
    view.subscription().unwrap().subscribed().await.unwrap();
    assert_eq!(backend.joined("deals-changes"), 1);

    drop(view);
    assert!(wait_until(|| backend.joined("deals-changes") == 0).await);
    assert!(sync.realtime().active_channels().is_empty());
}

#[tokio::test]
async fn configured_routes_mount_and_bad_filters_are_rejected() {
    let backend = MemoryBackend::new();
    let mut config = enabled();
    let mut contacts = RouteConfig::new("contacts-changes", "contacts");
    contacts.list_keys = vec!["contacts".into()];
    config.routes.push(contacts);
    let sync = live(&backend, config);

    let views = sync.watch_configured_routes().unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name(), "contacts-changes");

    let mut broken = RouteConfig::new("broken", "contacts");
    broken.filter = Some("owner_id>5".into());
    assert!(matches!(
        sync.watch_table(broken),
        Err(LiveSyncError::InvalidFilter(_))
    ));
}

#[tokio::test]
async fn mounting_a_view_twice_routes_each_change_once() {
    let backend = MemoryBackend::new();
    let sync = live(&backend, enabled());
    let first = sync.watch_submissions().unwrap();
    let second = sync.watch_submissions().unwrap();
    first.subscription().unwrap().subscribed().await.unwrap();

    assert_eq!(sync.realtime().active_channels(), ["submissions-changes"]);
    assert_eq!(backend.join_count("submissions-changes"), 1);

    let delivered = backend.emit_change(ChangeEvent::insert(
        "deals",
        row(json!({"id": "d1", "contact_name": "Ada Lovelace"})),
    ));
    assert_eq!(delivered, 1);
    assert!(wait_until(|| sync.notifications().len() == 1).await);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(sync.notifications().len(), 1);

    drop(first);
    assert!(second.is_live());
    assert_eq!(second.state(), SubscriptionState::Subscribed);
    assert_eq!(backend.joined("submissions-changes"), 1);

    drop(second);
    assert!(wait_until(|| backend.joined("submissions-changes") == 0).await);
}

#[tokio::test]
async fn remounting_after_the_last_view_drops_joins_again() {
    let backend = MemoryBackend::new();
    let sync = live(&backend, enabled());
    let view = sync.watch_deals().unwrap();
    view.subscription().unwrap().subscribed().await.unwrap();
    drop(view);
    assert!(wait_until(|| backend.joined("deals-changes") == 0).await);

    let again = sync.watch_deals().unwrap();
    again.subscription().unwrap().subscribed().await.unwrap();
    assert_eq!(backend.join_count("deals-changes"), 2);
}

#[tokio::test]
async fn key_only_delete_marks_the_owner_list_stale() {
    let backend = MemoryBackend::new();
    let sync = live(&backend, enabled());
    let mine = QueryKey::root("userSubmissions").with("U1");
    sync.queries().cache().set_query_data(mine.clone(), json!([{"id": "d1"}]));

    let view = sync.watch_user_submissions("U1").unwrap();
    view.subscription().unwrap().subscribed().await.unwrap();

    let delivered = backend.emit_change(ChangeEvent::delete("deals", row(json!({"id": "d1"}))));
    assert_eq!(delivered, 1);
    assert!(wait_until(|| {
        sync.queries().cache().get(&mine).unwrap().staleness == Staleness::Stale
    })
    .await);
    assert!(sync.notifications().is_empty());
}

#[tokio::test]
async fn a_failed_view_is_replaced_on_remount() {
    let backend = MemoryBackend::new();
    let sync = live(&backend, enabled());
    let failed = sync.watch_deals().unwrap();
    failed.subscription().unwrap().subscribed().await.unwrap();

    backend.push_status("deals-changes", ChannelStatus::ChannelError);
    assert!(wait_until(|| failed.state() == SubscriptionState::Error).await);

    let fresh = sync.watch_deals().unwrap();
    fresh.subscription().unwrap().subscribed().await.unwrap();
    assert_eq!(backend.join_count("deals-changes"), 2);
    assert!(fresh.state().is_active());
}
