// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mountable live views for the CRM dashboard.
//!
//! A [`LiveSync`] context owns the change feed client, the query cache, the
//! invalidation router, the notification dispatcher and the presence
//! tracker. Each `watch_*` call binds one table route to a channel and
//! returns a [`LiveView`] guard; dropping the guard unsubscribes. With
//! realtime disabled the guards are inert.

pub mod live;

pub use live::{LiveSync, LiveView, PresenceView};
