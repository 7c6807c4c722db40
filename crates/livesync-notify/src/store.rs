// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capped, in-memory notification list.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::broadcast;

use livesync_config::model::NotificationConfig;
use livesync_core::Timestamp;

/// Notifications kept when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 50;

/// Display style of a notification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// One user-facing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique per notification; repeated events produce distinct ids.
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub created_at: Timestamp,
    pub read: bool,
    /// Route that raised it, if it came from a change event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Row the notification is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            message: message.into(),
            created_at: Utc::now(),
            read: false,
            source: None,
            entity_id: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }
}

/// Most-recent-first notification list with oldest-first eviction.
pub struct NotificationStore {
    items: Mutex<VecDeque<Notification>>,
    capacity: usize,
    added: broadcast::Sender<Notification>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationStore {
    /// A store holding at most `capacity` notifications (minimum one).
    pub fn new(capacity: usize) -> Self {
        let (added, _) = broadcast::channel(64);
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            added,
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(config.capacity)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Receive every notification as it is added.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.added.subscribe()
    }

    /// Add a notification, evicting the oldest ones beyond capacity.
    ///
    /// Returns the evicted notifications.
    pub fn push(&self, notification: Notification) -> Vec<Notification> {
        let evicted = {
            let mut items = self.lock();
            items.push_front(notification.clone());
            let mut evicted = Vec::new();
            while items.len() > self.capacity {
                if let Some(old) = items.pop_back() {
                    evicted.push(old);
                }
            }
            evicted
        };
        let _ = self.added.send(notification);
        evicted
    }

    /// All notifications, newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.lock().iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.lock().iter().find(|n| n.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().iter().filter(|n| !n.read).count()
    }

    /// Returns `false` if no notification has that id.
    pub fn mark_read(&self, id: &str) -> bool {
        match self.lock().iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&self) {
        for notification in self.lock().iter_mut() {
            notification.read = true;
        }
    }

    pub fn remove(&self, id: &str) -> Option<Notification> {
        let mut items = self.lock();
        let index = items.iter().position(|n| n.id == id)?;
        items.remove(index)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
