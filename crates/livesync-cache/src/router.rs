// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns change events into cache effects.
//!
//! INSERT and DELETE mark the route's list queries stale (table-scoped, no
//! row reconciliation). UPDATE writes the new row straight into a cached
//! detail query and reports a transition when a tracked column changed.
//! Every processed event is then handed to the registered sinks.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use livesync_config::RouteConfig;
use livesync_core::{
    recording, ChangeBinding, ChangeEvent, ChangeSink, EventSpec, FieldTransition, LiveSyncError,
    Operation, QueryKey, RowFilter,
};

use crate::client::QueryClient;

/// A validated route ready to be bound to a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    config: RouteConfig,
    filter: Option<RowFilter>,
}

impl Route {
    pub fn new(config: RouteConfig) -> Result<Self, LiveSyncError> {
        let filter = config.filter.as_deref().map(str::parse).transpose()?;
        Ok(Self { config, filter })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    /// The change binding this route listens on.
    pub fn binding(&self) -> ChangeBinding {
        ChangeBinding {
            event: EventSpec::All,
            schema: self.config.schema.clone(),
            table: self.config.table.clone(),
            filter: self.filter.clone(),
        }
    }

    /// List queries affected by `event`, including owner-scoped lists for
    /// both the old and the new owner.
    fn list_keys(&self, event: &ChangeEvent) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .config
            .list_keys
            .iter()
            .map(|root| QueryKey::root(root.as_str()))
            .collect();

        if let (Some(column), Some(root)) = (&self.config.owner_column, &self.config.owner_list_key)
        {
            let mut owners: Vec<String> = [event.before.as_ref(), event.after.as_ref()]
                .into_iter()
                .flatten()
                .filter_map(|row| row.get(column).and_then(livesync_core::types::value_as_key))
                .collect();
            // Key-only DELETE images: the owner is whatever the filter pinned.
            if owners.is_empty() {
                owners.extend(
                    self.filter
                        .as_ref()
                        .filter(|filter| &filter.column == column)
                        .map(|filter| filter.value.clone()),
                );
            }
            for owner in owners {
                let key = QueryKey::root(root.as_str()).with(owner);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    fn detail_key(&self, event: &ChangeEvent) -> Option<QueryKey> {
        let root = self.config.detail_key.as_deref()?;
        let id = event.row_id(&self.config.id_column)?;
        Some(QueryKey::root(root).with(id))
    }

    fn transition(&self, event: &ChangeEvent) -> Option<FieldTransition> {
        self.config
            .tracked_fields
            .iter()
            .find_map(|field| event.transition(field))
    }
}

/// Cache effects of one routed event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteOutcome {
    /// `false` when the event did not match the route's binding.
    pub matched: bool,
    pub invalidated: Vec<QueryKey>,
    pub patched: Vec<QueryKey>,
    pub transition: Option<FieldTransition>,
}

/// Applies change events to the query cache and fans them out to sinks.
#[derive(Clone)]
pub struct InvalidationRouter {
    client: QueryClient,
    sinks: Vec<Arc<dyn ChangeSink>>,
}

impl InvalidationRouter {
    pub fn new(client: QueryClient) -> Self {
        Self {
            client,
            sinks: Vec::new(),
        }
    }

    /// Report every routed event to `sink` after cache effects are applied.
    pub fn with_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    /// Apply `event` to the cache according to `route`.
    ///
    /// Events outside the route's binding are ignored.
    pub fn handle(&self, route: &Route, event: &ChangeEvent) -> RouteOutcome {
        if !route.binding().matches(event) {
            return RouteOutcome::default();
        }

        let mut outcome = RouteOutcome {
            matched: true,
            ..RouteOutcome::default()
        };

        let invalidate_lists = match event.operation {
            Operation::Insert | Operation::Delete => true,
            Operation::Update => route.config.invalidate_lists_on_update,
        };
        if invalidate_lists {
            for key in route.list_keys(event) {
                outcome.invalidated.extend(self.client.invalidate(&key));
            }
        }

        if event.operation == Operation::Update {
            if let (Some(key), Some(after)) = (route.detail_key(event), event.after.as_ref()) {
                let row = Value::Object(after.clone());
                if self.client.cache().update_query_data(&key, |_| row) {
                    outcome.patched.push(key);
                }
            }
            outcome.transition = route.transition(event);
        }
        recording::record_patches(outcome.patched.len());

        debug!(
            route = route.name(),
            table = %event.table,
            operation = %event.operation,
            invalidated = outcome.invalidated.len(),
            patched = outcome.patched.len(),
            "change routed"
        );

        for sink in &self.sinks {
            sink.on_change(route.name(), event, outcome.transition.as_ref());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use livesync_core::Row;
    use livesync_test_utils::{MockFetcher, RecordingSink};
    use serde_json::json;

    use super::*;
    use crate::cache::{QueryCache, Staleness};

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("object")
    }

    fn router() -> (InvalidationRouter, Arc<RecordingSink>) {
        let client = QueryClient::new(Arc::new(QueryCache::new()), Arc::new(MockFetcher::new()));
        let sink = Arc::new(RecordingSink::new());
        (InvalidationRouter::new(client).with_sink(sink.clone()), sink)
    }

    #[test]
    fn route_rejects_bad_filter() {
        let mut config = RouteConfig::new("r", "deals");
        config.filter = Some("owner_id".into());
        assert!(Route::new(config).is_err());
    }

    #[test]
    fn owner_lists_cover_old_and_new_owner() {
        let route = Route::new(RouteConfig::user_submissions("U1")).unwrap();
        let event = ChangeEvent::update(
            "deals",
            row(json!({"id": "d1", "owner_id": "U1"})),
            row(json!({"id": "d1", "owner_id": "U2"})),
        );
        assert_eq!(
            route.list_keys(&event),
            vec![
                QueryKey::new(["userSubmissions", "U1"]),
                QueryKey::new(["userSubmissions", "U2"]),
            ]
        );
    }

    #[test]
    fn insert_marks_lists_stale_and_reports_to_sink() {
        let (router, sink) = router();
        let cache = router.client().cache().clone();
        cache.set_query_data(QueryKey::from("submissions"), json!([]));

        let route = Route::new(RouteConfig::submissions()).unwrap();
        let event = ChangeEvent::insert("deals", row(json!({"id": "d1"})));
        let outcome = router.handle(&route, &event);

        assert_eq!(outcome.invalidated, vec![QueryKey::from("submissions")]);
        assert_eq!(
            cache.get(&QueryKey::from("submissions")).unwrap().staleness,
            Staleness::Stale
        );
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.calls()[0].route, "submissions-changes");
    }

    #[test]
    fn update_patches_cached_detail_with_after_row() {
        let (router, _) = router();
        let cache = router.client().cache().clone();
        let detail = QueryKey::new(["submission", "d1"]);
        cache.set_query_data(detail.clone(), json!({"id": "d1", "status": "open"}));
        cache.set_query_data(QueryKey::from("submissions"), json!([]));

        let route = Route::new(RouteConfig::submissions()).unwrap();
        let after = json!({"id": "d1", "status": "won"});
        let event = ChangeEvent::update(
            "deals",
            row(json!({"id": "d1", "status": "open"})),
            row(after.clone()),
        );
        let outcome = router.handle(&route, &event);

        assert_eq!(outcome.patched, vec![detail.clone()]);
        assert_eq!(cache.get(&detail).unwrap().data, Some(after));
        assert!(outcome.invalidated.is_empty(), "lists untouched on update");
        assert_eq!(outcome.transition.unwrap().to_string(), "open → won");
    }

    #[test]
    fn update_without_cached_detail_is_silent() {
        let (router, sink) = router();
        let route = Route::new(RouteConfig::submissions()).unwrap();
        let event = ChangeEvent::update(
            "deals",
            row(json!({"id": "d7", "status": "open"})),
            row(json!({"id": "d7", "status": "open"})),
        );
        let outcome = router.handle(&route, &event);

        assert!(outcome.patched.is_empty());
        assert!(outcome.transition.is_none());
        assert!(router.client().cache().is_empty());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn key_only_delete_invalidates_the_filtered_owner_list() {
        let (router, sink) = router();
        let cache = router.client().cache().clone();
        let mine = QueryKey::new(["userSubmissions", "U1"]);
        cache.set_query_data(mine.clone(), json!([{"id": "d1"}]));

        let route = Route::new(RouteConfig::user_submissions("U1")).unwrap();
        let outcome = router.handle(&route, &ChangeEvent::delete("deals", row(json!({"id": "d1"}))));

        assert!(outcome.matched);
        assert_eq!(outcome.invalidated, vec![mine.clone()]);
        assert_eq!(cache.get(&mine).unwrap().staleness, Staleness::Stale);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn events_outside_the_binding_are_ignored() {
        let (router, sink) = router();
        let route = Route::new(RouteConfig::user_submissions("U1")).unwrap();
        let event = ChangeEvent::insert("deals", row(json!({"id": "d2", "owner_id": "U2"})));

        assert!(!router.handle(&route, &event).matched);
        assert!(sink.is_empty());
    }
}
