// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The task owning one multiplexed websocket.
//!
//! Channels are keyed by wire topic. Joining a topic that is already joined
//! on this socket supersedes the earlier channel, which is told `CLOSED`.

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use livesync_core::traits::{ChannelRequest, ClientMessage, ServerMessage};
use livesync_core::{ChangeBinding, ChannelStatus, LiveSyncError};

use crate::protocol::{self, Frame, Inbound, PHOENIX_TOPIC};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Requests from channel links to the socket task.
#[derive(Debug)]
pub(crate) enum Command {
    Join {
        key: u64,
        request: ChannelRequest,
        inbound: mpsc::Sender<ServerMessage>,
    },
    Push {
        key: u64,
        topic: String,
        message: ClientMessage,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct SocketSettings {
    pub heartbeat: Duration,
    pub access_token: Option<String>,
}

struct Joined {
    key: u64,
    name: String,
    join_ref: String,
    bindings: Vec<ChangeBinding>,
    /// Server ids of this channel's bindings, known once the join is accepted.
    binding_ids: Option<Vec<u64>>,
    inbound: mpsc::Sender<ServerMessage>,
}

struct Session {
    sink: SplitSink<WsStream, Message>,
    channels: HashMap<String, Joined>,
    next_ref: u64,
    pending_heartbeat: Option<String>,
    access_token: Option<String>,
}

/// Drive the socket until it fails, `shutdown` fires, or every command
/// sender is gone. Joined channels are told how it ended.
pub(crate) async fn run_socket(
    ws: WsStream,
    mut commands: mpsc::Receiver<Command>,
    settings: SocketSettings,
    shutdown: CancellationToken,
) {
    let (sink, mut stream) = ws.split();
    let mut session = Session {
        sink,
        channels: HashMap::new(),
        next_ref: 0,
        pending_heartbeat: None,
        access_token: settings.access_token,
    };

    let mut heartbeat = tokio::time::interval(settings.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    let status = loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break ChannelStatus::Closed,
            command = commands.recv() => {
                let Some(command) = command else {
                    break ChannelStatus::Closed;
                };
                if let Err(e) = session.command(command).await {
                    warn!(error = %e, "realtime socket write failed");
                    break ChannelStatus::ChannelError;
                }
            }
            _ = heartbeat.tick() => {
                if session.pending_heartbeat.is_some() {
                    warn!("realtime heartbeat not acknowledged; dropping socket");
                    break ChannelStatus::ChannelError;
                }
                if let Err(e) = session.heartbeat().await {
                    warn!(error = %e, "realtime heartbeat failed");
                    break ChannelStatus::ChannelError;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = session.receive(text.as_str()).await {
                        warn!(error = %e, "realtime socket write failed");
                        break ChannelStatus::ChannelError;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = session.sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "realtime socket closed by server");
                    break ChannelStatus::ChannelError;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "realtime socket error");
                    break ChannelStatus::ChannelError;
                }
                None => {
                    info!("realtime socket ended");
                    break ChannelStatus::ChannelError;
                }
            }
        }
    };

    session.end_all(status);
    let _ = session.sink.close().await;
    info!(status = %status, "realtime socket stopped");
}

impl Session {
    fn make_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    async fn write(&mut self, frame: Frame) -> Result<(), LiveSyncError> {
        let text = frame.encode()?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| LiveSyncError::Transport {
                message: format!("websocket send failed: {e}"),
                source: Some(Box::new(e)),
            })
    }

    async fn heartbeat(&mut self) -> Result<(), LiveSyncError> {
        let reference = self.make_ref();
        self.pending_heartbeat = Some(reference.clone());
        self.write(Frame::heartbeat().with_ref(reference)).await
    }

    async fn command(&mut self, command: Command) -> Result<(), LiveSyncError> {
        match command {
            Command::Join {
                key,
                request,
                inbound,
            } => {
                let topic = protocol::channel_topic(&request.topic);
                if let Some(previous) = self.channels.remove(&topic) {
                    debug!(channel = %previous.name, "superseded by a new join");
                    let _ = previous.inbound.try_send(ServerMessage::Status(ChannelStatus::Closed));
                }
                let join_ref = self.make_ref();
                let payload = protocol::join_payload(&request, self.access_token.as_deref());
                debug!(channel = %request.topic, join_ref = %join_ref, "joining channel");
                self.channels.insert(
                    topic.clone(),
                    Joined {
                        key,
                        name: request.topic,
                        join_ref: join_ref.clone(),
                        bindings: request.changes,
                        binding_ids: None,
                        inbound,
                    },
                );
                let frame = Frame::new(topic, "phx_join", payload)
                    .with_ref(join_ref.clone())
                    .with_join_ref(join_ref);
                self.write(frame).await
            }
            Command::Push {
                key,
                topic,
                message,
            } => {
                let topic = protocol::channel_topic(&topic);
                let Some(join_ref) = self
                    .channels
                    .get(&topic)
                    .filter(|joined| joined.key == key)
                    .map(|joined| joined.join_ref.clone())
                else {
                    return Ok(());
                };
                if message == ClientMessage::Leave {
                    self.channels.remove(&topic);
                }
                let reference = self.make_ref();
                let frame = protocol::client_frame(&topic, &message)
                    .with_ref(reference)
                    .with_join_ref(join_ref);
                self.write(frame).await
            }
        }
    }

    async fn receive(&mut self, text: &str) -> Result<(), LiveSyncError> {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable frame");
                return Ok(());
            }
        };

        if frame.topic == PHOENIX_TOPIC {
            if frame.event == "phx_reply" && frame.reference == self.pending_heartbeat {
                self.pending_heartbeat = None;
            }
            return Ok(());
        }

        let inbound = match Inbound::decode(&frame) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(topic = %frame.topic, event = %frame.event, error = %e, "ignoring frame");
                return Ok(());
            }
        };
        let Some(joined) = self.channels.get_mut(&frame.topic) else {
            debug!(topic = %frame.topic, event = %frame.event, "frame for unknown channel");
            return Ok(());
        };

        let mut messages = Vec::new();
        let mut ended = false;
        match inbound {
            Inbound::Reply { ok, response } => {
                if frame.reference.as_deref() != Some(joined.join_ref.as_str()) {
                    return Ok(());
                }
                if ok {
                    joined.binding_ids = Some(protocol::binding_ids(&response));
                    messages.push(ServerMessage::Status(ChannelStatus::Subscribed));
                } else {
                    warn!(channel = %joined.name, response = %response, "join refused");
                    messages.push(ServerMessage::Status(ChannelStatus::ChannelError));
                    ended = true;
                }
            }
            Inbound::Error => {
                messages.push(ServerMessage::Status(ChannelStatus::ChannelError));
                ended = true;
            }
            Inbound::Close => {
                messages.push(ServerMessage::Status(ChannelStatus::Closed));
                ended = true;
            }
            Inbound::System { ok: false, message } => {
                warn!(channel = %joined.name, detail = %message, "channel extension failed");
                messages.push(ServerMessage::Status(ChannelStatus::ChannelError));
                ended = true;
            }
            Inbound::Change { event, ids } => {
                let selected = match (&joined.binding_ids, ids.is_empty()) {
                    (Some(known), false) => ids.iter().any(|id| known.contains(id)),
                    _ => joined.bindings.iter().any(|binding| binding.matches(&event)),
                };
                if selected {
                    messages.push(ServerMessage::Change(event));
                }
            }
            Inbound::Presence(presence) => {
                messages.extend(presence.into_iter().map(ServerMessage::Presence));
            }
            Inbound::Broadcast(message) => messages.push(ServerMessage::Broadcast(message)),
            Inbound::System { ok: true, .. } | Inbound::Other => {}
        }

        let mut receiver_gone = false;
        for message in messages {
            match joined.inbound.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(dropped)) => {
                    warn!(channel = %joined.name, dropped = ?dropped, "channel buffer full; dropping");
                }
                Err(TrySendError::Closed(_)) => {
                    receiver_gone = true;
                    break;
                }
            }
        }

        if ended {
            self.channels.remove(&frame.topic);
        } else if receiver_gone {
            let join_ref = joined.join_ref.clone();
            self.channels.remove(&frame.topic);
            let reference = self.make_ref();
            let leave = protocol::client_frame(&frame.topic, &ClientMessage::Leave)
                .with_ref(reference)
                .with_join_ref(join_ref);
            return self.write(leave).await;
        }
        Ok(())
    }

    /// Report the socket's end to every joined channel.
    fn end_all(&mut self, status: ChannelStatus) {
        for (_, joined) in self.channels.drain() {
            debug!(channel = %joined.name, status = %status, "ending channel with socket");
            let _ = joined.inbound.try_send(ServerMessage::Status(status));
        }
    }
}
