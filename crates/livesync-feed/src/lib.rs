// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change feed client for the LiveSync view synchronization layer.
//!
//! [`RealtimeClient`] opens named channels on a [`RealtimeTransport`] and
//! hands back [`Subscription`] handles. Each channel is driven by its own
//! task; handlers registered on a channel run on that task in the order the
//! backend emitted the events.
//!
//! Channels that report `CHANNEL_ERROR` or `TIMED_OUT` are left inactive and
//! removed from the registry unless a [`ReconnectPolicy`] allows re-joining.
//!
//! [`RealtimeTransport`]: livesync_core::RealtimeTransport

pub mod backoff;
pub mod channel;
pub mod client;
pub mod subscription;

pub use backoff::ReconnectPolicy;
pub use channel::{BroadcastHandler, ChangeHandler, PresenceHandler, StatusHandler};
pub use client::{ChannelBuilder, RealtimeClient};
pub use subscription::Subscription;
