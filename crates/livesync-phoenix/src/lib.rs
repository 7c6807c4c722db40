// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime transport speaking the Phoenix channel protocol over a websocket.
//!
//! One socket carries every channel of a client. Database change bindings,
//! presence and broadcast are negotiated in the channel join; inbound frames
//! are decoded into [`livesync_core::traits::ServerMessage`]s for the change
//! feed.

pub mod protocol;
mod socket;
pub mod transport;

pub use transport::PhoenixTransport;
