// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router and query client working together on a shared cache.

use std::sync::Arc;

use livesync_cache::{InvalidationRouter, QueryCache, QueryClient, Route, Staleness};
use livesync_config::RouteConfig;
use livesync_core::{ChangeEvent, QueryKey, Row};
use livesync_test_utils::{wait_until, MockFetcher};
use serde_json::{json, Value};

fn row(value: Value) -> Row {
    value.as_object().cloned().expect("object")
}

fn setup() -> (Arc<MockFetcher>, InvalidationRouter) {
    let fetcher = Arc::new(MockFetcher::new());
    let client = QueryClient::new(Arc::new(QueryCache::new()), fetcher.clone());
    (fetcher, InvalidationRouter::new(client))
}

#[tokio::test]
async fn insert_and_delete_mark_list_stale_and_refetch_observed() {
    let (fetcher, router) = setup();
    let client = router.client().clone();
    let list = QueryKey::from("submissions");
    fetcher.respond(list.clone(), json!([{"id": "d0"}]));

    let _view = client.observe(list.clone());
    client.fetch_query(&list).await.unwrap();
    fetcher.respond(list.clone(), json!([{"id": "d0"}, {"id": "d1"}]));

    let route = Route::new(RouteConfig::submissions()).unwrap();
    let outcome = router.handle(&route, &ChangeEvent::insert("deals", row(json!({"id": "d1"}))));
    assert_eq!(outcome.invalidated, vec![list.clone()]);
    assert_ne!(client.cache().get(&list).unwrap().staleness, Staleness::Fresh);

    assert!(wait_until(|| client.cache().fresh_data(&list).is_some()).await);
    assert_eq!(
        client.cache().fresh_data(&list),
        Some(json!([{"id": "d0"}, {"id": "d1"}]))
    );

    router.handle(&route, &ChangeEvent::delete("deals", row(json!({"id": "d1"}))));
    assert_ne!(client.cache().get(&list).unwrap().staleness, Staleness::Fresh);
}

#[tokio::test]
async fn unobserved_lists_stay_stale_until_read() {
    let (fetcher, router) = setup();
    let client = router.client().clone();
    let list = QueryKey::from("submissions");
    client.cache().set_query_data(list.clone(), json!([]));

    let route = Route::new(RouteConfig::submissions()).unwrap();
    router.handle(&route, &ChangeEvent::insert("deals", row(json!({"id": "d1"}))));
    tokio::task::yield_now().await;

    assert_eq!(fetcher.total_fetches(), 0);
    assert_eq!(client.cache().get(&list).unwrap().staleness, Staleness::Stale);
}

#[tokio::test]
async fn invalidation_bursts_keep_one_fetch_in_flight() {
    let (fetcher, router) = setup();
    let client = router.client().clone();
    let list = QueryKey::from("submissions");
    let _view = client.observe(list.clone());
    client.cache().set_query_data(list.clone(), json!([]));

    fetcher.pause();
    let route = Route::new(RouteConfig::submissions()).unwrap();
    for id in ["d1", "d2", "d3", "d4"] {
        router.handle(&route, &ChangeEvent::insert("deals", row(json!({"id": id}))));
    }
    assert!(wait_until(|| fetcher.in_flight() == 1).await);
    assert_eq!(
        client.cache().get(&list).unwrap().staleness,
        Staleness::Refetching
    );

    fetcher.resume();
    assert!(wait_until(|| client.cache().fresh_data(&list).is_some()).await);

    // The first fetch plus exactly one follow-up for the invalidations that
    // arrived while it was running.
    assert_eq!(fetcher.fetch_count(&list), 2);
    assert_eq!(fetcher.max_in_flight(), 1);
}

#[tokio::test]
async fn failed_refetch_is_retried_on_next_read() {
    let (fetcher, router) = setup();
    let client = router.client().clone();
    let list = QueryKey::from("deals");
    let _view = client.observe(list.clone());
    client.cache().set_query_data(list.clone(), json!([]));
    fetcher.fail_next(list.clone(), 2, "backend down");

    let route = Route::new(RouteConfig::deals()).unwrap();
    router.handle(&route, &ChangeEvent::insert("deals", row(json!({"id": "d1"}))));
    assert!(
        wait_until(|| client
            .cache()
            .get(&list)
            .is_some_and(|e| e.error.is_some() && e.staleness == Staleness::Stale))
        .await
    );
    assert_eq!(fetcher.fetch_count(&list), 2);

    fetcher.respond(list.clone(), json!([{"id": "d1"}]));
    let entry = client.read(&list).unwrap();
    assert_eq!(entry.staleness, Staleness::Stale);
    assert!(wait_until(|| client.cache().fresh_data(&list).is_some()).await);
    assert!(client.cache().get(&list).unwrap().error.is_none());
}

#[tokio::test]
async fn discarded_when_view_unmounts_mid_fetch() {
    let (fetcher, router) = setup();
    let client = router.client().clone();
    let list = QueryKey::from("submissions");
    let view = client.observe(list.clone());
    client.cache().set_query_data(list.clone(), json!(["old"]));
    fetcher.respond(list.clone(), json!(["new"]));
    fetcher.pause();

    let route = Route::new(RouteConfig::submissions()).unwrap();
    router.handle(&route, &ChangeEvent::insert("deals", row(json!({"id": "d1"}))));
    assert!(wait_until(|| fetcher.in_flight() == 1).await);

    drop(view);
    fetcher.resume();
    assert!(wait_until(|| fetcher.in_flight() == 0).await);
    assert!(
        wait_until(|| client.cache().get(&list).unwrap().staleness == Staleness::Stale).await
    );
    assert_eq!(client.cache().get(&list).unwrap().data, Some(json!(["old"])));
}

#[tokio::test]
async fn owner_update_invalidates_owner_list() {
    let (_, router) = setup();
    let client = router.client().clone();
    let mine = QueryKey::new(["userSubmissions", "U1"]);
    client.cache().set_query_data(mine.clone(), json!([]));

    let route = Route::new(RouteConfig::user_submissions("U1")).unwrap();
    let outcome = router.handle(
        &route,
        &ChangeEvent::update(
            "deals",
            row(json!({"id": "d1", "owner_id": "U1", "status": "open"})),
            row(json!({"id": "d1", "owner_id": "U1", "status": "contacted"})),
        ),
    );

    assert_eq!(outcome.invalidated, vec![mine.clone()]);
    assert_eq!(client.cache().get(&mine).unwrap().staleness, Staleness::Stale);
}

#[tokio::test]
async fn key_only_delete_on_owner_route_refetches_that_owners_list() {
    let (fetcher, router) = setup();
    let client = router.client().clone();
    let mine = QueryKey::root("userSubmissions").with("U1");
    let theirs = QueryKey::root("userSubmissions").with("U2");
    client.cache().set_query_data(theirs.clone(), json!([{"id": "d9"}]));
    fetcher.respond(mine.clone(), json!([{"id": "d1"}]));

    let _view = client.observe(mine.clone());
    client.fetch_query(&mine).await.unwrap();
    fetcher.respond(mine.clone(), json!([]));

    let route = Route::new(RouteConfig::user_submissions("U1")).unwrap();
    let outcome = router.handle(&route, &ChangeEvent::delete("deals", row(json!({"id": "d1"}))));

    assert!(outcome.matched);
    assert_eq!(outcome.invalidated, vec![mine.clone()]);
    assert!(wait_until(|| client.cache().fresh_data(&mine) == Some(json!([]))).await);
    assert_eq!(client.cache().get(&theirs).unwrap().staleness, Staleness::Fresh);
}
