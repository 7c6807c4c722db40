// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-facing notifications for LiveSync.
//!
//! The [`NotificationDispatcher`] receives routed change events as a
//! [`ChangeSink`](livesync_core::ChangeSink), applies per-route copy and
//! priority rules, and appends to a capped [`NotificationStore`].

pub mod dispatcher;
pub mod store;

pub use dispatcher::NotificationDispatcher;
pub use store::{Notification, NotificationKind, NotificationStore, DEFAULT_CAPACITY};
