// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory realtime backend for deterministic testing.
//!
//! `MemoryBackend` implements `RealtimeTransport` without a network. It
//! evaluates change bindings server-side the way the real backend does, keeps
//! per-topic presence rosters, relays broadcasts between channels on the same
//! topic, and lets tests inject status codes and control join replies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use livesync_core::traits::{ChannelLink, ChannelRequest, ClientMessage, ServerMessage};
use livesync_core::{
    ChangeEvent, ChannelStatus, LiveSyncError, PresenceMessage, PresenceRecord, RealtimeTransport,
};

/// How the backend answers a join on a given topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinReply {
    /// Reply with the given status.
    Status(ChannelStatus),
    /// Never reply; the client's join timeout fires.
    Silent,
    /// Fail `open_channel` itself.
    Refuse,
}

struct JoinedChannel {
    id: u64,
    request: ChannelRequest,
    inbound: mpsc::Sender<ServerMessage>,
}

#[derive(Default)]
struct BackendState {
    next_id: u64,
    channels: Vec<JoinedChannel>,
    /// Per topic, tracked records keyed by the joined channel that sent them.
    rosters: HashMap<String, HashMap<u64, PresenceRecord>>,
    replies: HashMap<String, Vec<JoinReply>>,
    joins: Vec<ChannelRequest>,
    received: Vec<(String, ClientMessage)>,
}

/// A realtime backend living in process memory.
///
/// Clones share state, so a test can keep one clone for injection while the
/// client under test owns another.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<BackendState>>,
    buffer: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState::default())),
            buffer: 256,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue join replies for `topic`, consumed one per join. Once the queue
    /// is empty, joins succeed.
    pub fn script_joins(&self, topic: &str, replies: impl IntoIterator<Item = JoinReply>) {
        self.lock()
            .replies
            .entry(topic.to_string())
            .or_default()
            .extend(replies);
    }

    /// Emit a change event. It reaches every channel with a matching
    /// binding. Returns the number of channels it was delivered to.
    pub fn emit_change(&self, event: ChangeEvent) -> usize {
        let targets: Vec<mpsc::Sender<ServerMessage>> = self
            .lock()
            .channels
            .iter()
            .filter(|c| c.request.changes.iter().any(|b| b.matches(&event)))
            .map(|c| c.inbound.clone())
            .collect();
        targets
            .iter()
            .filter(|tx| tx.try_send(ServerMessage::Change(event.clone())).is_ok())
            .count()
    }

    /// Push a status code to every channel on `topic`.
    pub fn push_status(&self, topic: &str, status: ChannelStatus) {
        let targets = self.senders_on(topic, None);
        for tx in targets {
            let _ = tx.try_send(ServerMessage::Status(status));
        }
    }

    /// Simulate a lost socket: every joined channel gets `CHANNEL_ERROR`.
    pub fn drop_connection(&self) {
        let mut state = self.lock();
        for channel in state.channels.drain(..) {
            let _ = channel
                .inbound
                .try_send(ServerMessage::Status(ChannelStatus::ChannelError));
        }
        state.rosters.clear();
    }

    /// Number of joins received for `topic` so far.
    pub fn join_count(&self, topic: &str) -> usize {
        self.lock().joins.iter().filter(|r| r.topic == topic).count()
    }

    /// The most recent join request for `topic`.
    pub fn last_join(&self, topic: &str) -> Option<ChannelRequest> {
        self.lock()
            .joins
            .iter()
            .rev()
            .find(|r| r.topic == topic)
            .cloned()
    }

    /// Number of channels currently joined on `topic`.
    pub fn joined(&self, topic: &str) -> usize {
        self.lock()
            .channels
            .iter()
            .filter(|c| c.request.topic == topic)
            .count()
    }

    /// Current presence roster for `topic`, sorted by user id.
    pub fn roster(&self, topic: &str) -> Vec<PresenceRecord> {
        let mut records: Vec<PresenceRecord> = self
            .lock()
            .rosters
            .get(topic)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        records
    }

    /// Every client message received, in order, tagged with its topic.
    pub fn received(&self) -> Vec<(String, ClientMessage)> {
        self.lock().received.clone()
    }

    fn senders_on(&self, topic: &str, except: Option<u64>) -> Vec<mpsc::Sender<ServerMessage>> {
        self.lock()
            .channels
            .iter()
            .filter(|c| c.request.topic == topic && Some(c.id) != except)
            .map(|c| c.inbound.clone())
            .collect()
    }

    fn handle_client(&self, id: u64, message: ClientMessage) {
        let (topic, broadcast_self) = {
            let mut state = self.lock();
            let Some(channel) = state.channels.iter().find(|c| c.id == id) else {
                return;
            };
            let entry = (channel.request.topic.clone(), channel.request.broadcast_self);
            state.received.push((entry.0.clone(), message.clone()));
            entry
        };

        match message {
            ClientMessage::Track(mut record) => {
                record.presence_ref = Some(format!("mem-{id}"));
                self.lock()
                    .rosters
                    .entry(topic.clone())
                    .or_default()
                    .insert(id, record.clone());
                for tx in self.senders_on(&topic, None) {
                    let _ = tx.try_send(ServerMessage::Presence(PresenceMessage::Join(vec![
                        record.clone(),
                    ])));
                }
            }
            ClientMessage::Untrack => self.remove_presence(&topic, id),
            ClientMessage::Broadcast(message) => {
                let except = if broadcast_self { None } else { Some(id) };
                for tx in self.senders_on(&topic, except) {
                    let _ = tx.try_send(ServerMessage::Broadcast(message.clone()));
                }
            }
            ClientMessage::Leave => self.leave(id),
        }
    }

    fn remove_presence(&self, topic: &str, id: u64) {
        let removed = self
            .lock()
            .rosters
            .get_mut(topic)
            .and_then(|roster| roster.remove(&id));
        if let Some(record) = removed {
            for tx in self.senders_on(topic, None) {
                let _ = tx.try_send(ServerMessage::Presence(PresenceMessage::Leave(vec![
                    record.clone(),
                ])));
            }
        }
    }

    fn leave(&self, id: u64) {
        let removed = {
            let mut state = self.lock();
            let index = state.channels.iter().position(|c| c.id == id);
            index.map(|i| state.channels.remove(i))
        };
        if let Some(channel) = removed {
            self.remove_presence(&channel.request.topic, channel.id);
        }
    }
}

#[async_trait]
impl RealtimeTransport for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open_channel(&self, request: ChannelRequest) -> Result<ChannelLink, LiveSyncError> {
        let (inbound_tx, inbound_rx) = mpsc::channel(self.buffer);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(self.buffer);

        let (id, reply, snapshot) = {
            let mut state = self.lock();
            state.joins.push(request.clone());
            let reply = state
                .replies
                .get_mut(&request.topic)
                .and_then(|queue| (!queue.is_empty()).then(|| queue.remove(0)))
                .unwrap_or(JoinReply::Status(ChannelStatus::Subscribed));

            if reply == JoinReply::Refuse {
                return Err(LiveSyncError::transport(format!(
                    "join refused for `{}`",
                    request.topic
                )));
            }

            state.next_id += 1;
            let id = state.next_id;
            let snapshot: Vec<PresenceRecord> = state
                .rosters
                .get(&request.topic)
                .map(|r| r.values().cloned().collect())
                .unwrap_or_default();
            if reply == JoinReply::Status(ChannelStatus::Subscribed) {
                state.channels.push(JoinedChannel {
                    id,
                    request: request.clone(),
                    inbound: inbound_tx.clone(),
                });
            }
            (id, reply, snapshot)
        };

        if let JoinReply::Status(status) = reply {
            let _ = inbound_tx.try_send(ServerMessage::Status(status));
            if status == ChannelStatus::Subscribed && request.presence_key.is_some() {
                let _ = inbound_tx.try_send(ServerMessage::Presence(PresenceMessage::Sync(snapshot)));
            }
        }

        let backend = self.clone();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let leaving = message == ClientMessage::Leave;
                backend.handle_client(id, message);
                if leaving {
                    return;
                }
            }
            backend.leave(id);
        });

        Ok(ChannelLink {
            inbound: inbound_rx,
            outbound: outbound_tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use livesync_core::{ChangeBinding, Row, RowFilter};
    use serde_json::json;

    use super::*;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn join_replies_subscribed_by_default() {
        let backend = MemoryBackend::new();
        let mut link = backend
            .open_channel(ChannelRequest::new("deals-changes"))
            .await
            .unwrap();
        assert_eq!(
            link.inbound.recv().await,
            Some(ServerMessage::Status(ChannelStatus::Subscribed))
        );
        assert_eq!(backend.joined("deals-changes"), 1);
    }

    #[tokio::test]
    async fn filters_changes_server_side() {
        let backend = MemoryBackend::new();
        let mut request = ChannelRequest::new("mine");
        request
            .changes
            .push(ChangeBinding::table("deals").with_filter(RowFilter::eq("owner_id", "U1")));
        let mut link = backend.open_channel(request).await.unwrap();
        let _ = link.inbound.recv().await;

        let theirs = ChangeEvent::insert("deals", row(json!({"id": "d2", "owner_id": "U2"})));
        let mine = ChangeEvent::insert("deals", row(json!({"id": "d1", "owner_id": "U1"})));
        assert_eq!(backend.emit_change(theirs), 0);
        assert_eq!(backend.emit_change(mine.clone()), 1);
        assert_eq!(link.inbound.recv().await, Some(ServerMessage::Change(mine)));
    }

    #[tokio::test]
    async fn scripted_failure_is_reported_then_joins_succeed() {
        let backend = MemoryBackend::new();
        backend.script_joins("t", [JoinReply::Status(ChannelStatus::ChannelError)]);

        let mut first = backend.open_channel(ChannelRequest::new("t")).await.unwrap();
        assert_eq!(
            first.inbound.recv().await,
            Some(ServerMessage::Status(ChannelStatus::ChannelError))
        );
        let mut second = backend.open_channel(ChannelRequest::new("t")).await.unwrap();
        assert_eq!(
            second.inbound.recv().await,
            Some(ServerMessage::Status(ChannelStatus::Subscribed))
        );
        assert_eq!(backend.join_count("t"), 2);
    }

    #[tokio::test]
    async fn refused_join_fails_open() {
        let backend = MemoryBackend::new();
        backend.script_joins("t", [JoinReply::Refuse]);
        assert!(backend.open_channel(ChannelRequest::new("t")).await.is_err());
    }
}
