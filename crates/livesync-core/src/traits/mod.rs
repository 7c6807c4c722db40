// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seam traits between the synchronization layer and its collaborators.
//!
//! The backend is reached only through [`RealtimeTransport`] (change feed,
//! presence, broadcast) and [`QueryFetcher`] (refetching cached queries).
//! Change routing reports to a [`ChangeSink`].

pub mod fetcher;
pub mod sink;
pub mod transport;

pub use fetcher::QueryFetcher;
pub use sink::ChangeSink;
pub use transport::{ChannelLink, ChannelRequest, ClientMessage, RealtimeTransport, ServerMessage};
