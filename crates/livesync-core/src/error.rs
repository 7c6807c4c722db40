// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the LiveSync view synchronization layer.

use thiserror::Error;

use crate::types::ChannelStatus;

/// The primary error type used across all LiveSync crates.
#[derive(Debug, Error)]
pub enum LiveSyncError {
    /// Configuration errors (invalid TOML, missing required fields, bad route declarations).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport errors (socket failure, handshake failure, closed link).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A channel reported a non-subscribed terminal status.
    #[error("channel `{channel_id}` ended with status {status}")]
    Subscription {
        channel_id: String,
        status: ChannelStatus,
    },

    /// A channel id is already active with different bindings.
    #[error("channel `{channel_id}` is already active with different bindings")]
    DuplicateChannel { channel_id: String },

    /// A row predicate could not be parsed.
    #[error("invalid row filter: {0}")]
    InvalidFilter(String),

    /// A query refetch failed.
    #[error("fetch failed for {key}: {message}")]
    Fetch { key: String, message: String },

    /// A frame from the backend could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LiveSyncError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        LiveSyncError::Transport {
            message: message.into(),
            source: None,
        }
    }
}
