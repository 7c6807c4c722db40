// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decides which change events surface as notifications.
//!
//! Rules per route:
//! - INSERT whose priority column holds the urgent value raises a warning.
//! - Any other INSERT raises an info notification if the route has insert copy.
//! - UPDATE that changed a tracked column raises a success notification
//!   naming the old and new value, if the route has update copy.
//!
//! DELETE never notifies.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use livesync_config::{RouteConfig, RouteNotifyConfig};
use livesync_core::types::value_as_key;
use livesync_core::{recording, ChangeEvent, ChangeSink, FieldTransition, Operation};

use crate::store::{Notification, NotificationKind, NotificationStore};

/// Column naming a row when a route does not say otherwise.
const DEFAULT_ID_COLUMN: &str = "id";

struct RouteRules {
    notify: RouteNotifyConfig,
    id_column: String,
}

/// Converts routed change events and explicit signals into notifications.
pub struct NotificationDispatcher {
    store: Arc<NotificationStore>,
    routes: RwLock<HashMap<String, RouteRules>>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<NotificationStore>) -> Self {
        Self {
            store,
            routes: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    fn read_routes(&self) -> RwLockReadGuard<'_, HashMap<String, RouteRules>> {
        self.routes.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_routes(&self) -> RwLockWriteGuard<'_, HashMap<String, RouteRules>> {
        self.routes.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install the notification rules declared by `route`, if it has any.
    ///
    /// Notifications name their entity by the route's id column.
    pub fn register(&self, route: &RouteConfig) {
        if let Some(notify) = &route.notify {
            self.insert_rules(&route.name, notify.clone(), &route.id_column);
        }
    }

    /// Install `rules` for `route`, replacing earlier ones. Rows are
    /// identified by their `id` column.
    pub fn register_route(&self, route: impl Into<String>, rules: RouteNotifyConfig) {
        self.insert_rules(&route.into(), rules, DEFAULT_ID_COLUMN);
    }

    fn insert_rules(&self, route: &str, notify: RouteNotifyConfig, id_column: &str) {
        self.write_routes().insert(
            route.to_string(),
            RouteRules {
                notify,
                id_column: id_column.to_string(),
            },
        );
    }

    pub fn unregister_route(&self, route: &str) {
        self.write_routes().remove(route);
    }

    /// Queue a notification raised directly by the application.
    pub fn notify(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Notification {
        self.dispatch(Notification::new(kind, title, message))
    }

    fn dispatch(&self, notification: Notification) -> Notification {
        recording::record_notification(&notification.kind.to_string());
        debug!(
            kind = %notification.kind,
            title = %notification.title,
            source = notification.source.as_deref().unwrap_or("app"),
            "notification queued"
        );
        self.store.push(notification.clone());
        notification
    }

    /// The notification `event` would raise under `rules`, if any.
    ///
    /// `id_column` names the row the notification points at.
    pub fn build(
        route: &str,
        rules: &RouteNotifyConfig,
        id_column: &str,
        event: &ChangeEvent,
        transition: Option<&FieldTransition>,
    ) -> Option<Notification> {
        let name = display_name(rules, id_column, event);
        let notification = match event.operation {
            Operation::Insert if is_urgent(rules, event) => Notification::new(
                NotificationKind::Warning,
                rules.urgent_title.as_str(),
                format!("Urgent activity from {name}"),
            ),
            Operation::Insert => Notification::new(
                NotificationKind::Info,
                rules.insert_title.as_deref()?,
                format!("New submission from {name}"),
            ),
            Operation::Update => {
                let transition = transition?;
                Notification::new(
                    NotificationKind::Success,
                    rules.update_title.as_deref()?,
                    format!("{name} moved {transition}"),
                )
            }
            Operation::Delete => return None,
        };

        let notification = notification.with_source(route);
        Some(match event.row_id(id_column) {
            Some(id) => notification.with_entity(id),
            None => notification,
        })
    }
}

impl ChangeSink for NotificationDispatcher {
    fn on_change(&self, route: &str, event: &ChangeEvent, transition: Option<&FieldTransition>) {
        let notification = {
            let routes = self.read_routes();
            let Some(rules) = routes.get(route) else {
                return;
            };
            Self::build(route, &rules.notify, &rules.id_column, event, transition)
        };
        if let Some(notification) = notification {
            self.dispatch(notification);
        }
    }
}

fn is_urgent(rules: &RouteNotifyConfig, event: &ChangeEvent) -> bool {
    event
        .field(&rules.priority_field)
        .and_then(value_as_key)
        .is_some_and(|tier| tier.eq_ignore_ascii_case(&rules.urgent_value))
}

/// First non-empty display column, falling back to the row id.
fn display_name(rules: &RouteNotifyConfig, id_column: &str, event: &ChangeEvent) -> String {
    rules
        .display_fields
        .iter()
        .filter_map(|column| event.field(column).and_then(value_as_key))
        .find(|value| !value.trim().is_empty())
        .or_else(|| event.row_id(id_column))
        .unwrap_or_else(|| "unknown".to_string())
}
