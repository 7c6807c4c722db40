// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime transport trait for the backend change-notification stream.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::LiveSyncError;
use crate::filter::ChangeBinding;
use crate::types::{BroadcastMessage, ChangeEvent, ChannelStatus, PresenceMessage, PresenceRecord};

/// What a client asks the backend for when joining a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    /// Channel name, unique per client.
    pub topic: String,
    /// Database change bindings evaluated server-side.
    pub changes: Vec<ChangeBinding>,
    /// Presence key for this client, if the channel carries presence.
    pub presence_key: Option<String>,
    /// Whether broadcasts sent by this client are echoed back to it.
    pub broadcast_self: bool,
}

impl ChannelRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            changes: Vec::new(),
            presence_key: None,
            broadcast_self: false,
        }
    }
}

/// Messages delivered from the backend on a joined channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Status(ChannelStatus),
    Change(ChangeEvent),
    Presence(PresenceMessage),
    Broadcast(BroadcastMessage),
}

/// Messages a client sends on a joined channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Track(PresenceRecord),
    Untrack,
    Broadcast(BroadcastMessage),
    Leave,
}

/// Both directions of one joined channel.
///
/// The transport reports the join outcome as the first
/// [`ServerMessage::Status`] on `inbound`. Dropping `inbound` or sending
/// [`ClientMessage::Leave`] releases the channel on the backend.
#[derive(Debug)]
pub struct ChannelLink {
    pub inbound: mpsc::Receiver<ServerMessage>,
    pub outbound: mpsc::Sender<ClientMessage>,
}

/// Connection to the backend's realtime service.
#[async_trait]
pub trait RealtimeTransport: Send + Sync + 'static {
    /// Human-readable transport name used in logs.
    fn name(&self) -> &str;

    /// Starts joining a channel. Returns as soon as the join was sent; the
    /// outcome arrives on the returned link.
    async fn open_channel(&self, request: ChannelRequest) -> Result<ChannelLink, LiveSyncError>;
}
