// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the LiveSync view synchronization layer.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the LiveSync workspace. Transports, fetchers
//! and notification sinks implement the traits defined here.

pub mod error;
pub mod filter;
pub mod query_key;
pub mod recording;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::LiveSyncError;
pub use filter::{ChangeBinding, RowFilter};
pub use query_key::QueryKey;
pub use types::{
    BroadcastMessage, ChangeEvent, ChannelStatus, EventSpec, FieldTransition, Operation,
    PresenceMessage, PresenceRecord, PresenceScope, Row, SubscriptionState, Timestamp,
};

// Re-export all seam traits at crate root.
pub use traits::{ChangeSink, QueryFetcher, RealtimeTransport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn livesync_error_has_all_variants() {
        let _config = LiveSyncError::Config("test".into());
        let _transport = LiveSyncError::Transport {
            message: "test".into(),
            source: None,
        };
        let _subscription = LiveSyncError::Subscription {
            channel_id: "deals".into(),
            status: ChannelStatus::ChannelError,
        };
        let _duplicate = LiveSyncError::DuplicateChannel {
            channel_id: "deals".into(),
        };
        let _filter = LiveSyncError::InvalidFilter("owner_id".into());
        let _fetch = LiveSyncError::Fetch {
            key: "['submissions']".into(),
            message: "boom".into(),
        };
        let _protocol = LiveSyncError::Protocol("bad frame".into());
        let _timeout = LiveSyncError::Timeout {
            duration: std::time::Duration::from_secs(10),
        };
        let _internal = LiveSyncError::Internal("test".into());
    }

    #[test]
    fn channel_status_round_trips_through_wire_names() {
        use std::str::FromStr;

        let variants = [
            (ChannelStatus::Subscribed, "SUBSCRIBED"),
            (ChannelStatus::ChannelError, "CHANNEL_ERROR"),
            (ChannelStatus::TimedOut, "TIMED_OUT"),
            (ChannelStatus::Closed, "CLOSED"),
        ];

        for (variant, wire) in variants {
            assert_eq!(variant.to_string(), wire);
            assert_eq!(ChannelStatus::from_str(wire).expect("should parse"), variant);
        }
    }

    #[test]
    fn all_seam_traits_are_exported() {
        fn _assert_transport<T: RealtimeTransport>() {}
        fn _assert_fetcher<T: QueryFetcher>() {}
        fn _assert_sink<T: ChangeSink>() {}
    }
}
