// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the feed, cache, presence and notification crates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// A database row as delivered by the change feed.
pub type Row = serde_json::Map<String, Value>;

/// Wall-clock timestamp used for receipt times and presence heartbeats.
pub type Timestamp = DateTime<Utc>;

/// Kind of row mutation carried by a [`ChangeEvent`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// Which operations a change binding listens for.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventSpec {
    #[default]
    #[strum(serialize = "*")]
    #[serde(rename = "*")]
    All,
    Insert,
    Update,
    Delete,
}

impl EventSpec {
    /// Returns `true` if an event of `op` is selected by this spec.
    pub fn matches(self, op: Operation) -> bool {
        match self {
            EventSpec::All => true,
            EventSpec::Insert => op == Operation::Insert,
            EventSpec::Update => op == Operation::Update,
            EventSpec::Delete => op == Operation::Delete,
        }
    }
}

/// A single row change emitted by the backend.
///
/// Produced once per mutation and consumed once; ordering is only meaningful
/// within the channel that delivered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub operation: Operation,
    #[serde(default)]
    pub before: Option<Row>,
    #[serde(default)]
    pub after: Option<Row>,
    #[serde(default = "Utc::now")]
    pub received_at: Timestamp,
}

impl ChangeEvent {
    /// Build an INSERT event.
    pub fn insert(table: impl Into<String>, after: Row) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Insert,
            before: None,
            after: Some(after),
            received_at: Utc::now(),
        }
    }

    /// Build an UPDATE event.
    pub fn update(table: impl Into<String>, before: Row, after: Row) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Update,
            before: Some(before),
            after: Some(after),
            received_at: Utc::now(),
        }
    }

    /// Build a DELETE event.
    pub fn delete(table: impl Into<String>, before: Row) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Delete,
            before: Some(before),
            after: None,
            received_at: Utc::now(),
        }
    }

    /// The row image that best describes the affected record: `after` for
    /// inserts and updates, `before` for deletes.
    pub fn row(&self) -> Option<&Row> {
        self.after.as_ref().or(self.before.as_ref())
    }

    /// Look up a column on the affected row.
    pub fn field(&self, column: &str) -> Option<&Value> {
        self.row()?.get(column)
    }

    /// The affected row's identifier rendered as a key segment.
    pub fn row_id(&self, id_column: &str) -> Option<String> {
        self.field(id_column).and_then(value_as_key)
    }

    /// For UPDATE events, the old and new values of `column` when they differ.
    ///
    /// Returns `None` when the old image does not carry the column (the
    /// backend only ships full old rows for tables with full replica identity).
    pub fn transition(&self, column: &str) -> Option<FieldTransition> {
        if self.operation != Operation::Update {
            return None;
        }
        let from = self.before.as_ref()?.get(column)?;
        let to = self.after.as_ref()?.get(column)?;
        if from == to {
            return None;
        }
        Some(FieldTransition {
            field: column.to_string(),
            from: from.clone(),
            to: to.clone(),
        })
    }
}

/// Render a scalar JSON value as a key segment.
///
/// Strings are used verbatim; numbers and booleans use their JSON text.
/// Nulls, arrays and objects have no key form.
pub fn value_as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A tracked column whose value changed in an UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTransition {
    pub field: String,
    pub from: Value,
    pub to: Value,
}

impl fmt::Display for FieldTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = value_as_key(&self.from).unwrap_or_else(|| self.from.to_string());
        let to = value_as_key(&self.to).unwrap_or_else(|| self.to.to_string());
        write!(f, "{from} → {to}")
    }
}

/// Status codes reported by the backend for a channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

/// Lifecycle state of a subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionState {
    Connecting,
    Subscribed,
    Error,
    TimedOut,
    Closed,
}

impl SubscriptionState {
    /// A subscription is active while it can still deliver events.
    pub fn is_active(self) -> bool {
        matches!(self, SubscriptionState::Connecting | SubscriptionState::Subscribed)
    }
}

impl From<ChannelStatus> for SubscriptionState {
    fn from(status: ChannelStatus) -> Self {
        match status {
            ChannelStatus::Subscribed => SubscriptionState::Subscribed,
            ChannelStatus::ChannelError => SubscriptionState::Error,
            ChannelStatus::TimedOut => SubscriptionState::TimedOut,
            ChannelStatus::Closed => SubscriptionState::Closed,
        }
    }
}

/// A client's own presence payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewing_entity_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub last_seen: Timestamp,
    /// Connection that asserted the record, assigned by the server. A user
    /// with several tabs open holds one record per ref.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_ref: Option<String>,
}

impl PresenceRecord {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            current_page: None,
            viewing_entity_id: None,
            last_seen: Utc::now(),
            presence_ref: None,
        }
    }
}

/// Which roster a presence record is asserted into.
///
/// The global roster and per-entity rosters ride on distinct channels and
/// never share state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PresenceScope {
    Global,
    Entity(String),
}

impl PresenceScope {
    /// Channel topic used for this scope.
    pub fn topic(&self) -> String {
        match self {
            PresenceScope::Global => "online-users".to_string(),
            PresenceScope::Entity(id) => format!("entity:{id}"),
        }
    }
}

impl fmt::Display for PresenceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic())
    }
}

/// Presence traffic delivered on a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceMessage {
    /// Full roster snapshot, sent after joining.
    Sync(Vec<PresenceRecord>),
    /// Peers that joined (or re-asserted) since the last message.
    Join(Vec<PresenceRecord>),
    /// Peers that left.
    Leave(Vec<PresenceRecord>),
}

/// An ephemeral message outside the database change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn event_spec_selects_operations() {
        assert!(EventSpec::All.matches(Operation::Delete));
        assert!(EventSpec::Insert.matches(Operation::Insert));
        assert!(!EventSpec::Insert.matches(Operation::Update));
        assert_eq!(EventSpec::All.to_string(), "*");
        assert_eq!("update".parse::<EventSpec>().unwrap(), EventSpec::Update);
    }

    #[test]
    fn delete_event_reads_identity_from_before_image() {
        let event = ChangeEvent::delete("deals", row(json!({"id": "d1"})));
        assert_eq!(event.row_id("id").as_deref(), Some("d1"));
    }

    #[test]
    fn numeric_ids_render_as_key_segments() {
        let event = ChangeEvent::insert("deals", row(json!({"id": 42})));
        assert_eq!(event.row_id("id").as_deref(), Some("42"));
    }

    #[test]
    fn transition_reports_changed_tracked_field() {
        let event = ChangeEvent::update(
            "deals",
            row(json!({"id": "d1", "status": "open"})),
            row(json!({"id": "d1", "status": "won"})),
        );
        let transition = event.transition("status").expect("status changed");
        assert_eq!(transition.to_string(), "open → won");
        assert!(event.transition("id").is_none());
    }

    #[test]
    fn transition_requires_old_image_column() {
        let event = ChangeEvent::update(
            "deals",
            row(json!({"id": "d1"})),
            row(json!({"id": "d1", "status": "won"})),
        );
        assert!(event.transition("status").is_none());
    }

    #[test]
    fn change_event_deserializes_without_receipt_time() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "table": "deals",
            "operation": "INSERT",
            "after": {"id": "d1"}
        }))
        .expect("valid event");
        assert_eq!(event.operation, Operation::Insert);
        assert!(event.before.is_none());
    }

    #[test]
    fn presence_scopes_have_distinct_topics() {
        assert_eq!(PresenceScope::Global.topic(), "online-users");
        assert_eq!(PresenceScope::Entity("e1".into()).topic(), "entity:e1");
    }

    #[test]
    fn channel_status_maps_to_subscription_state() {
        assert_eq!(
            SubscriptionState::from(ChannelStatus::TimedOut),
            SubscriptionState::TimedOut
        );
        assert!(!SubscriptionState::from(ChannelStatus::ChannelError).is_active());
        assert!(SubscriptionState::Connecting.is_active());
    }
}
