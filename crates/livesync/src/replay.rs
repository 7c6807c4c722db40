// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `livesync replay` command implementation.
//!
//! Reads recorded change events, one JSON object per line, and routes each
//! through the same invalidation router and notification dispatcher the
//! live views use. Lines may be either a serialized change event or a raw
//! `postgres_changes` payload as captured from the socket.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use livesync_cache::{InvalidationRouter, QueryCache, QueryClient, Route};
use livesync_config::model::LiveSyncConfig;
use livesync_config::RouteConfig;
use livesync_core::{ChangeEvent, ChangeSink, LiveSyncError, Operation, QueryKey};
use livesync_notify::{Notification, NotificationDispatcher, NotificationStore};

use crate::offline::OfflineFetcher;

/// What one replayed event did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayLine {
    pub line: usize,
    pub summary: String,
    pub routes: Vec<String>,
    pub invalidated: Vec<QueryKey>,
    pub patched: Vec<QueryKey>,
}

#[derive(Debug, Default)]
pub struct ReplayReport {
    pub lines: Vec<ReplayLine>,
    pub skipped: usize,
    /// Oldest first.
    pub notifications: Vec<Notification>,
}

impl ReplayReport {
    pub fn print(&self) {
        for line in &self.lines {
            println!("line {}: {}", line.line, line.summary);
            if line.routes.is_empty() {
                println!("  no matching route");
                continue;
            }
            println!("  routes: {}", line.routes.join(", "));
            for key in &line.invalidated {
                println!("  invalidated {key}");
            }
            for key in &line.patched {
                println!("  patched {key}");
            }
        }
        if self.skipped > 0 {
            println!("skipped {} unreadable line(s)", self.skipped);
        }
        println!("notifications ({}):", self.notifications.len());
        for n in &self.notifications {
            println!("  [{}] {}: {}", n.kind, n.title, n.message);
        }
    }
}

/// The routes a dashboard session would mount under `config`.
fn session_routes(config: &LiveSyncConfig, user: Option<&str>) -> Result<Vec<Route>, LiveSyncError> {
    let mut routes = vec![RouteConfig::submissions()];
    if config.realtime.features.deals {
        routes.push(RouteConfig::deals());
    }
    if let Some(user) = user {
        routes.push(RouteConfig::user_submissions(user));
    }
    routes.extend(config.routes.iter().cloned());
    routes.into_iter().map(Route::new).collect()
}

fn parse_event(line: &str) -> Result<ChangeEvent, LiveSyncError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| LiveSyncError::Protocol(format!("not JSON: {e}")))?;
    if value.get("operation").is_some() {
        serde_json::from_value(value)
            .map_err(|e| LiveSyncError::Protocol(format!("not a change event: {e}")))
    } else {
        livesync_phoenix::protocol::change_from_payload(&value)
    }
}

fn describe(event: &ChangeEvent) -> String {
    let id = event.row_id("id").unwrap_or_else(|| "?".to_string());
    format!("{} {} {id}", event.operation, event.table)
}

/// Run the `livesync replay` command.
pub async fn run_replay(
    config: &LiveSyncConfig,
    path: &Path,
    user: Option<&str>,
) -> Result<ReplayReport, LiveSyncError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LiveSyncError::Internal(format!("cannot read {}: {e}", path.display())))?;
    let routes = session_routes(config, user)?;

    let cache = Arc::new(QueryCache::new());
    for route in &routes {
        let route = route.config();
        for list in &route.list_keys {
            cache.set_query_data(QueryKey::root(list.as_str()), json!([]));
        }
        if let (Some(owner_list), Some(user)) = (&route.owner_list_key, user) {
            cache.set_query_data(QueryKey::root(owner_list.as_str()).with(user), json!([]));
        }
    }

    let client = QueryClient::from_config(Arc::clone(&cache), Arc::new(OfflineFetcher), &config.cache);
    let dispatcher = Arc::new(NotificationDispatcher::new(Arc::new(
        NotificationStore::from_config(&config.notifications),
    )));
    for route in &routes {
        dispatcher.register(route.config());
    }
    let sink: Arc<dyn ChangeSink> = dispatcher.clone();
    let router = InvalidationRouter::new(client).with_sink(sink);

    let mut report = ReplayReport::default();
    for (index, raw) in text.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let event = match parse_event(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = index + 1, error = %e, "skipping line");
                report.skipped += 1;
                continue;
            }
        };

        let mut line = ReplayLine {
            line: index + 1,
            summary: describe(&event),
            routes: Vec::new(),
            invalidated: Vec::new(),
            patched: Vec::new(),
        };
        for route in &routes {
            prime_detail(&cache, route, &event);
            let outcome = router.handle(route, &event);
            if outcome.matched {
                line.routes.push(route.name().to_string());
                line.invalidated.extend(outcome.invalidated);
                line.patched.extend(outcome.patched);
            }
        }
        debug!(line = line.line, routes = line.routes.len(), "replayed");
        report.lines.push(line);
    }

    let mut notifications = dispatcher.store().list();
    notifications.reverse();
    report.notifications = notifications;
    Ok(report)
}

/// Seed the detail entry an UPDATE would patch with the row's old image.
fn prime_detail(cache: &QueryCache, route: &Route, event: &ChangeEvent) {
    if event.operation != Operation::Update {
        return;
    }
    let config = route.config();
    let (Some(detail), Some(id)) = (&config.detail_key, event.row_id(&config.id_column)) else {
        return;
    };
    let key = QueryKey::root(detail.as_str()).with(id);
    if cache.get(&key).is_none() {
        let row = event.before.clone().or_else(|| event.after.clone()).unwrap_or_default();
        cache.set_query_data(key, Value::Object(row));
    }
}
