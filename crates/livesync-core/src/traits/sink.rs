// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Receiver for routed change events.

use crate::types::{ChangeEvent, FieldTransition};

/// Receives every change event the invalidation router processed.
///
/// Called synchronously on the channel task after cache effects are applied.
/// `transition` is set when a tracked column changed value in an UPDATE.
pub trait ChangeSink: Send + Sync + 'static {
    fn on_change(&self, route: &str, event: &ChangeEvent, transition: Option<&FieldTransition>);
}
