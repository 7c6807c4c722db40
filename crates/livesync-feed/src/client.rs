// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The realtime client and its channel builder.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use livesync_config::model::RealtimeConfig;
use livesync_core::recording;
use livesync_core::traits::ChannelRequest;
use livesync_core::{
    BroadcastMessage, ChangeBinding, ChangeEvent, ChannelStatus, LiveSyncError, PresenceMessage,
    RealtimeTransport, RowFilter,
};

use crate::backoff::ReconnectPolicy;
use crate::channel::{run_channel, ChannelInner, Listener, Registry};
use crate::subscription::Subscription;

const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Entry point to the backend change feed.
///
/// Cheap to clone; clones share one channel registry.
#[derive(Clone)]
pub struct RealtimeClient {
    transport: Arc<dyn RealtimeTransport>,
    registry: Arc<Registry>,
    policy: ReconnectPolicy,
    join_timeout: Duration,
}

impl RealtimeClient {
    /// A client with no automatic reconnect and a 10 second join timeout.
    pub fn new(transport: Arc<dyn RealtimeTransport>) -> Self {
        Self {
            transport,
            registry: Arc::new(Registry::default()),
            policy: ReconnectPolicy::disabled(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    pub fn from_config(transport: Arc<dyn RealtimeTransport>, config: &RealtimeConfig) -> Self {
        Self::new(transport)
            .with_reconnect(ReconnectPolicy::from_config(&config.reconnect))
            .with_join_timeout(Duration::from_secs(config.join_timeout_secs))
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Start describing a channel named `name`.
    pub fn channel(&self, name: impl Into<String>) -> ChannelBuilder {
        let name = name.into();
        ChannelBuilder {
            client: self.clone(),
            request: ChannelRequest::new(name.clone()),
            name,
            listeners: Vec::new(),
            independent: false,
        }
    }

    /// Subscribe to every change on `table`, optionally narrowed by `filter`.
    ///
    /// The channel is named after the table and filter, so two callers
    /// watching the same slice share one channel.
    pub fn subscribe<F>(
        &self,
        table: &str,
        filter: Option<RowFilter>,
        on_event: F,
    ) -> Result<Subscription, LiveSyncError>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let name = match &filter {
            Some(filter) => format!("{table}-changes:{filter}"),
            None => format!("{table}-changes"),
        };
        let mut binding = ChangeBinding::table(table);
        binding.filter = filter;
        self.channel(name).on(binding, on_event).subscribe()
    }

    /// Ids of channels currently registered.
    pub fn active_channels(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registry
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Tear down a channel regardless of how many handles hold it.
    ///
    /// Returns `false` if no channel with that id is registered.
    pub fn remove_channel(&self, id: &str) -> bool {
        match self.registry.channels.remove(id) {
            Some((_, inner)) => {
                inner.cancel.cancel();
                recording::set_active_channels(self.registry.channels.len());
                info!(channel = %id, "channel removed");
                true
            }
            None => false,
        }
    }

    /// Tear down every channel.
    pub fn remove_all_channels(&self) {
        for id in self.active_channels() {
            self.remove_channel(&id);
        }
    }

    fn spawn_driver(&self, inner: Arc<ChannelInner>) -> Result<(), LiveSyncError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LiveSyncError::Internal(format!("no tokio runtime: {e}")))?;
        runtime.spawn(run_channel(
            inner,
            Arc::clone(&self.transport),
            Arc::clone(&self.registry),
            self.policy,
            self.join_timeout,
        ));
        Ok(())
    }
}

/// Describes a channel's bindings before it is subscribed.
pub struct ChannelBuilder {
    client: RealtimeClient,
    name: String,
    request: ChannelRequest,
    listeners: Vec<Listener>,
    independent: bool,
}

impl ChannelBuilder {
    /// Listen for database changes selected by `binding`.
    pub fn on<F>(mut self, binding: ChangeBinding, handler: F) -> Self
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        if !self.request.changes.contains(&binding) {
            self.request.changes.push(binding.clone());
        }
        self.listeners.push(Listener::Change {
            binding,
            handler: Arc::new(handler),
        });
        self
    }

    /// Listen for presence `sync`/`join`/`leave` traffic.
    pub fn on_presence<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PresenceMessage) + Send + Sync + 'static,
    {
        self.listeners.push(Listener::Presence(Arc::new(handler)));
        self
    }

    /// Listen for broadcasts named `event` (`"*"` for all).
    pub fn on_broadcast<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&BroadcastMessage) + Send + Sync + 'static,
    {
        self.listeners.push(Listener::Broadcast {
            event: event.into(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Observe channel status transitions.
    pub fn on_status<F>(mut self, handler: F) -> Self
    where
        F: Fn(ChannelStatus) + Send + Sync + 'static,
    {
        self.listeners.push(Listener::Status(Arc::new(handler)));
        self
    }

    /// Key under which this client's presence record is stored.
    pub fn presence_key(mut self, key: impl Into<String>) -> Self {
        self.request.presence_key = Some(key.into());
        self
    }

    /// Receive this client's own broadcasts.
    pub fn broadcast_self(mut self, echo: bool) -> Self {
        self.request.broadcast_self = echo;
        self
    }

    /// Never share this channel: it gets a unique id suffix.
    pub fn independent(mut self) -> Self {
        self.independent = true;
        self
    }

    /// Register the channel and start joining it in the background.
    ///
    /// If a live channel with the same id and identical bindings exists, the
    /// new handle shares it. The same id with different bindings fails with
    /// [`LiveSyncError::DuplicateChannel`].
    pub fn subscribe(self) -> Result<Subscription, LiveSyncError> {
        let ChannelBuilder {
            client,
            name,
            request,
            listeners,
            independent,
        } = self;

        let id = if independent {
            format!("{name}#{}", uuid::Uuid::new_v4().simple())
        } else {
            name
        };

        // Listeners attach while the registry entry is locked, so a handle
        // released concurrently cannot tear the channel down underneath us.
        let registry = Arc::clone(&client.registry);
        let (inner, handle, fresh) = match registry.channels.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get();
                if existing.state().is_active() && !existing.cancel.is_cancelled() {
                    if existing.request != request {
                        return Err(LiveSyncError::DuplicateChannel { channel_id: id });
                    }
                    debug!(channel = %id, "sharing existing channel");
                    let handle = existing.attach(listeners);
                    (Arc::clone(existing), handle, false)
                } else {
                    let inner = Arc::new(ChannelInner::new(id.clone(), request));
                    let handle = inner.attach(listeners);
                    occupied.insert(Arc::clone(&inner));
                    (inner, handle, true)
                }
            }
            Entry::Vacant(vacant) => {
                let inner = Arc::new(ChannelInner::new(id.clone(), request));
                let handle = inner.attach(listeners);
                vacant.insert(Arc::clone(&inner));
                (inner, handle, true)
            }
        };
        let subscription = Subscription::new(Arc::clone(&inner), registry, handle);

        if fresh {
            debug!(channel = %id, transport = client.transport.name(), "joining channel");
            client.spawn_driver(inner)?;
        }
        recording::set_active_channels(client.registry.channels.len());
        Ok(subscription)
    }
}
