// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phoenix channel frames as spoken by the realtime service.
//!
//! Every websocket text message is one JSON object with `topic`, `event`,
//! `payload` and `ref`. Channel topics are `realtime:<channel name>`; the
//! socket-level heartbeat uses the reserved `phoenix` topic.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use livesync_core::traits::{ChannelRequest, ClientMessage};
use livesync_core::{
    BroadcastMessage, ChangeEvent, LiveSyncError, Operation, PresenceMessage, PresenceRecord, Row,
};

/// Topic carrying socket heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Serializer version requested on the socket URL.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// One websocket message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl Frame {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            reference: None,
            join_ref: None,
        }
    }

    pub fn with_ref(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_join_ref(mut self, join_ref: impl Into<String>) -> Self {
        self.join_ref = Some(join_ref.into());
        self
    }

    pub fn heartbeat() -> Self {
        Self::new(PHOENIX_TOPIC, "heartbeat", json!({}))
    }

    pub fn encode(&self) -> Result<String, LiveSyncError> {
        serde_json::to_string(self)
            .map_err(|e| LiveSyncError::Protocol(format!("cannot encode frame: {e}")))
    }

    pub fn decode(text: &str) -> Result<Self, LiveSyncError> {
        serde_json::from_str(text)
            .map_err(|e| LiveSyncError::Protocol(format!("malformed frame: {e}")))
    }
}

/// Wire topic for a channel name.
pub fn channel_topic(name: &str) -> String {
    format!("realtime:{name}")
}

/// Websocket endpoint for a project URL.
///
/// `http(s)` schemes are rewritten to `ws(s)`; a trailing slash is ignored.
/// Query parameters are form-encoded.
pub fn socket_url(base: &str, api_key: &str) -> String {
    let base = base.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("apikey", api_key)
        .append_pair("vsn", PROTOCOL_VERSION)
        .finish();
    format!("{base}/realtime/v1/websocket?{query}")
}

/// `phx_join` payload describing everything the channel wants delivered.
pub fn join_payload(request: &ChannelRequest, access_token: Option<&str>) -> Value {
    let changes: Vec<Value> = request
        .changes
        .iter()
        .map(|binding| {
            let mut entry = json!({
                "event": binding.event.to_string(),
                "schema": binding.schema,
                "table": binding.table,
            });
            if let Some(filter) = &binding.filter {
                entry["filter"] = Value::String(filter.to_string());
            }
            entry
        })
        .collect();

    let mut payload = json!({
        "config": {
            "broadcast": { "self": request.broadcast_self, "ack": false },
            "presence": { "key": request.presence_key.clone().unwrap_or_default() },
            "postgres_changes": changes,
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }
    payload
}

/// Frame for a message a client sends on a joined channel.
pub fn client_frame(topic: &str, message: &ClientMessage) -> Frame {
    match message {
        ClientMessage::Track(record) => Frame::new(
            topic,
            "presence",
            json!({ "type": "presence", "event": "track", "payload": record }),
        ),
        ClientMessage::Untrack => Frame::new(
            topic,
            "presence",
            json!({ "type": "presence", "event": "untrack" }),
        ),
        ClientMessage::Broadcast(message) => Frame::new(
            topic,
            "broadcast",
            json!({ "type": "broadcast", "event": message.event, "payload": message.payload }),
        ),
        ClientMessage::Leave => Frame::new(topic, "phx_leave", json!({})),
    }
}

/// A decoded frame addressed to a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a push; `ok` is `false` for error replies.
    Reply { ok: bool, response: Value },
    /// The channel crashed on the server.
    Error,
    /// The server closed the channel.
    Close,
    /// A database change and the server-side binding ids it matched.
    Change { event: ChangeEvent, ids: Vec<u64> },
    Presence(Vec<PresenceMessage>),
    Broadcast(BroadcastMessage),
    /// Service notice; `ok` is `false` when a channel extension failed.
    System { ok: bool, message: String },
    Other,
}

impl Inbound {
    pub fn decode(frame: &Frame) -> Result<Self, LiveSyncError> {
        let payload = &frame.payload;
        Ok(match frame.event.as_str() {
            "phx_reply" => Inbound::Reply {
                ok: payload.get("status").and_then(Value::as_str) == Some("ok"),
                response: payload.get("response").cloned().unwrap_or(Value::Null),
            },
            "phx_error" => Inbound::Error,
            "phx_close" => Inbound::Close,
            "postgres_changes" => decode_change(payload)?,
            "presence_state" => Inbound::Presence(vec![PresenceMessage::Sync(presences(payload))]),
            "presence_diff" => {
                let mut messages = Vec::new();
                let joins = presences(payload.get("joins").unwrap_or(&Value::Null));
                if !joins.is_empty() {
                    messages.push(PresenceMessage::Join(joins));
                }
                let leaves = presences(payload.get("leaves").unwrap_or(&Value::Null));
                if !leaves.is_empty() {
                    messages.push(PresenceMessage::Leave(leaves));
                }
                Inbound::Presence(messages)
            }
            "broadcast" => Inbound::Broadcast(
                serde_json::from_value(payload.clone())
                    .map_err(|e| LiveSyncError::Protocol(format!("malformed broadcast: {e}")))?,
            ),
            "system" => Inbound::System {
                ok: payload.get("status").and_then(Value::as_str) != Some("error"),
                message: payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            _ => Inbound::Other,
        })
    }
}

/// Server-side ids assigned to each `postgres_changes` binding in a join reply.
pub fn binding_ids(response: &Value) -> Vec<u64> {
    response
        .get("postgres_changes")
        .and_then(Value::as_array)
        .map(|bindings| {
            bindings
                .iter()
                .filter_map(|b| b.get("id").and_then(Value::as_u64))
                .collect()
        })
        .unwrap_or_default()
}

/// Decode a recorded `postgres_changes` payload into a change event.
pub fn change_from_payload(payload: &Value) -> Result<ChangeEvent, LiveSyncError> {
    match decode_change(payload)? {
        Inbound::Change { event, .. } => Ok(event),
        _ => Err(LiveSyncError::Protocol("payload is not a change".into())),
    }
}

fn decode_change(payload: &Value) -> Result<Inbound, LiveSyncError> {
    let data = payload.get("data").unwrap_or(payload);
    let kind = data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(Value::as_str)
        .ok_or_else(|| LiveSyncError::Protocol("change without a type".into()))?;
    let operation: Operation = kind
        .parse()
        .map_err(|_| LiveSyncError::Protocol(format!("unknown change type `{kind}`")))?;
    let table = data
        .get("table")
        .and_then(Value::as_str)
        .ok_or_else(|| LiveSyncError::Protocol("change without a table".into()))?;

    let after = image(data, "record", "new");
    let before = image(data, "old_record", "old");
    match operation {
        Operation::Insert | Operation::Update if after.is_none() => {
            return Err(LiveSyncError::Protocol(format!("{operation} on {table} without a row")));
        }
        Operation::Delete if before.is_none() => {
            return Err(LiveSyncError::Protocol(format!("DELETE on {table} without a row")));
        }
        _ => {}
    }

    let ids = payload
        .get("ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();

    Ok(Inbound::Change {
        event: ChangeEvent {
            table: table.to_string(),
            operation,
            before: if operation == Operation::Insert { None } else { before },
            after: if operation == Operation::Delete { None } else { after },
            received_at: Utc::now(),
        },
        ids,
    })
}

/// A row image under either of its field names. Empty objects count as absent.
fn image(data: &Value, name: &str, legacy: &str) -> Option<Row> {
    data.get(name)
        .or_else(|| data.get(legacy))
        .and_then(Value::as_object)
        .filter(|row| !row.is_empty())
        .cloned()
}

/// Records in a `{key: {metas: [...]}}` presence map, one per meta.
///
/// The newest meta wins. Metas missing an identity take it from the key.
fn presences(map: &Value) -> Vec<PresenceRecord> {
    let Some(map) = map.as_object() else {
        return Vec::new();
    };
    map.iter()
        .flat_map(|(key, entry)| {
            let metas = entry
                .get("metas")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            metas.iter().filter_map(Value::as_object).map(move |meta| (key, meta))
        })
        .filter_map(|(key, meta)| {
            let mut meta: Map<String, Value> = meta.clone();
            meta.entry("user_id").or_insert_with(|| Value::String(key.clone()));
            meta.entry("username").or_insert_with(|| Value::String(key.clone()));
            if !meta.contains_key("presence_ref") {
                if let Some(phx_ref) = meta.get("phx_ref").cloned() {
                    meta.insert("presence_ref".to_string(), phx_ref);
                }
            }
            match serde_json::from_value(Value::Object(meta)) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(key = %key, error = %e, "skipping unreadable presence");
                    None
                }
            }
        })
        .collect()
}
