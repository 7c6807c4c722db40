// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription handles returned by [`crate::RealtimeClient`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::watch;

use livesync_core::traits::ClientMessage;
use livesync_core::{BroadcastMessage, LiveSyncError, PresenceRecord, SubscriptionState};

use crate::channel::{ChannelInner, Registry};

/// A live attachment to one channel.
///
/// Several handles may share a channel when they subscribed with the same id
/// and identical bindings. The channel is left on the backend once the last
/// handle closes. Dropping a handle closes it.
pub struct Subscription {
    channel: Arc<ChannelInner>,
    registry: Arc<Registry>,
    handle: u64,
    closed: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(channel: Arc<ChannelInner>, registry: Arc<Registry>, handle: u64) -> Self {
        Self {
            channel,
            registry,
            handle,
            closed: AtomicBool::new(false),
        }
    }

    /// The channel id this handle is attached to.
    pub fn channel_id(&self) -> &str {
        &self.channel.id
    }

    /// The backend topic of the channel.
    pub fn topic(&self) -> &str {
        &self.channel.request.topic
    }

    pub fn state(&self) -> SubscriptionState {
        if self.is_closed() {
            SubscriptionState::Closed
        } else {
            self.channel.state()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Watch the channel's lifecycle state.
    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.channel.watch_state()
    }

    /// Wait until the channel has left `CONNECTING`, returning the state it
    /// settled in.
    pub async fn settled(&self) -> SubscriptionState {
        let mut rx = self.channel.watch_state();
        match rx
            .wait_for(|state| *state != SubscriptionState::Connecting)
            .await
        {
            Ok(state) => *state,
            Err(_) => SubscriptionState::Closed,
        }
    }

    /// Wait for the join to succeed.
    ///
    /// Fails with [`LiveSyncError::Subscription`] if the channel settles in
    /// any other state.
    pub async fn subscribed(&self) -> Result<(), LiveSyncError> {
        use livesync_core::ChannelStatus;

        let status = match self.settled().await {
            SubscriptionState::Subscribed => return Ok(()),
            SubscriptionState::TimedOut => ChannelStatus::TimedOut,
            SubscriptionState::Error => ChannelStatus::ChannelError,
            SubscriptionState::Closed | SubscriptionState::Connecting => ChannelStatus::Closed,
        };
        Err(LiveSyncError::Subscription {
            channel_id: self.channel.id.clone(),
            status,
        })
    }

    /// Assert this client's presence record on the channel.
    ///
    /// The record is kept and re-sent whenever the channel (re)joins, so it
    /// may be called before the join completes.
    pub fn track(&self, record: PresenceRecord) -> Result<(), LiveSyncError> {
        self.ensure_open()?;
        self.channel.set_presence(Some(record.clone()));
        if self.channel.state() == SubscriptionState::Subscribed {
            self.channel.send(ClientMessage::Track(record))?;
        }
        Ok(())
    }

    /// Remove this client's presence record from the channel.
    pub fn untrack(&self) -> Result<(), LiveSyncError> {
        self.ensure_open()?;
        self.channel.set_presence(None);
        if self.channel.state() == SubscriptionState::Subscribed {
            self.channel.send(ClientMessage::Untrack)?;
        }
        Ok(())
    }

    /// Send an ephemeral broadcast to the channel's peers.
    pub fn send_broadcast(
        &self,
        event: impl Into<String>,
        payload: Value,
    ) -> Result<(), LiveSyncError> {
        self.ensure_open()?;
        self.channel.send(ClientMessage::Broadcast(BroadcastMessage {
            event: event.into(),
            payload,
        }))
    }

    /// Release this handle. Calling it again is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.channel.detach_listeners(self.handle);
        self.registry.release(&self.channel);
        tracing::debug!(channel = %self.channel.id, "subscription closed");
    }

    fn ensure_open(&self) -> Result<(), LiveSyncError> {
        if self.is_closed() {
            return Err(LiveSyncError::Subscription {
                channel_id: self.channel.id.clone(),
                status: livesync_core::ChannelStatus::Closed,
            });
        }
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel_id", &self.channel.id)
            .field("state", &self.state())
            .finish()
    }
}
