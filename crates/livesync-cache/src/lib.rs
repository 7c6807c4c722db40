// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query cache and cache invalidation router for LiveSync.
//!
//! - [`QueryCache`] holds query results keyed by [`QueryKey`] tuples with
//!   FRESH / STALE / REFETCHING tracking.
//! - [`QueryClient`] reads through the cache and refetches stale entries in
//!   the background, one fetch per key at a time.
//! - [`InvalidationRouter`] applies change events to the cache per [`Route`].
//!
//! [`QueryKey`]: livesync_core::QueryKey

pub mod cache;
pub mod client;
pub mod router;

pub use cache::{CachedQuery, ObserverGuard, QueryCache, RefetchOutcome, Staleness};
pub use client::QueryClient;
pub use router::{InvalidationRouter, Route, RouteOutcome};
