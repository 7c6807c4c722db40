// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`RealtimeTransport`] over a lazily opened Phoenix websocket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use livesync_config::model::RealtimeConfig;
use livesync_core::traits::{ChannelLink, ChannelRequest, ClientMessage, RealtimeTransport};
use livesync_core::LiveSyncError;

use crate::protocol;
use crate::socket::{run_socket, Command, SocketSettings};

const COMMAND_BUFFER: usize = 64;

struct Connection {
    commands: mpsc::Sender<Command>,
    /// Cancelled by the socket task when it stops.
    stopped: CancellationToken,
}

/// Multiplexes every channel of one client over a single websocket.
///
/// The socket is opened on the first join and re-opened by the next join
/// after it drops. Channels joined on a dropped socket receive
/// `CHANNEL_ERROR` and are not re-joined here; that is the change feed's
/// reconnect policy.
pub struct PhoenixTransport {
    endpoint: String,
    settings: SocketSettings,
    buffer: usize,
    connection: Mutex<Option<Connection>>,
    next_key: AtomicU64,
    shutdown: CancellationToken,
}

impl PhoenixTransport {
    /// A transport for the project at `url` authenticated with `api_key`.
    pub fn new(url: &str, api_key: &str) -> Self {
        let defaults = RealtimeConfig::default();
        Self {
            endpoint: protocol::socket_url(url, api_key),
            settings: SocketSettings {
                heartbeat: Duration::from_secs(defaults.heartbeat_interval_secs),
                access_token: Some(api_key.to_string()),
            },
            buffer: defaults.channel_buffer,
            connection: Mutex::new(None),
            next_key: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Build from the `[realtime]` section; `url` and `api_key` are required.
    pub fn from_config(config: &RealtimeConfig) -> Result<Self, LiveSyncError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| LiveSyncError::Config("realtime.url is not set".into()))?;
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| LiveSyncError::Config("realtime.api_key is not set".into()))?;
        let mut transport = Self::new(url, api_key)
            .with_heartbeat(Duration::from_secs(config.heartbeat_interval_secs.max(1)))
            .with_buffer(config.channel_buffer);
        if let Some(token) = &config.access_token {
            transport.settings.access_token = Some(token.clone());
        }
        Ok(transport)
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.settings.heartbeat = heartbeat;
        self
    }

    /// Per-channel inbound and outbound queue size.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Close the socket. Joined channels receive `CLOSED`; later joins fail.
    pub fn disconnect(&self) {
        self.shutdown.cancel();
    }

    /// Whether a socket is currently open.
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| !c.stopped.is_cancelled())
    }

    async fn connect(&self) -> Result<mpsc::Sender<Command>, LiveSyncError> {
        if self.shutdown.is_cancelled() {
            return Err(LiveSyncError::transport("transport has been disconnected"));
        }
        let mut connection = self.connection.lock().await;
        if let Some(live) = connection.as_ref().filter(|c| !c.stopped.is_cancelled()) {
            return Ok(live.commands.clone());
        }

        let (ws, _response) = tokio_tungstenite::connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| LiveSyncError::Transport {
                message: format!("websocket connect failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        info!("realtime socket connected");

        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let stopped = CancellationToken::new();
        let guard = stopped.clone().drop_guard();
        let settings = self.settings.clone();
        let shutdown = self.shutdown.child_token();
        tokio::spawn(async move {
            let _guard = guard;
            run_socket(ws, receiver, settings, shutdown).await;
        });

        *connection = Some(Connection {
            commands: commands.clone(),
            stopped,
        });
        Ok(commands)
    }
}

#[async_trait]
impl RealtimeTransport for PhoenixTransport {
    fn name(&self) -> &str {
        "phoenix"
    }

    async fn open_channel(&self, request: ChannelRequest) -> Result<ChannelLink, LiveSyncError> {
        let commands = self.connect().await?;
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let (inbound_tx, inbound) = mpsc::channel(self.buffer);
        let (outbound, mut outbound_rx) = mpsc::channel(self.buffer);

        let topic = request.topic.clone();
        commands
            .send(Command::Join {
                key,
                request,
                inbound: inbound_tx,
            })
            .await
            .map_err(|_| LiveSyncError::transport("realtime socket closed before join"))?;

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let leaving = message == ClientMessage::Leave;
                let push = Command::Push {
                    key,
                    topic: topic.clone(),
                    message,
                };
                if commands.send(push).await.is_err() || leaving {
                    return;
                }
            }
            debug!(channel = %topic, "link dropped; leaving channel");
            let _ = commands
                .send(Command::Push {
                    key,
                    topic,
                    message: ClientMessage::Leave,
                })
                .await;
        });

        Ok(ChannelLink { inbound, outbound })
    }
}

impl std::fmt::Debug for PhoenixTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhoenixTransport")
            .field("heartbeat", &self.settings.heartbeat)
            .field("buffer", &self.buffer)
            .finish()
    }
}
