// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change sink that records what the router reported.

use std::sync::Mutex;

use livesync_core::{ChangeEvent, ChangeSink, FieldTransition};

/// One `on_change` call.
#[derive(Debug, Clone)]
pub struct RecordedChange {
    pub route: String,
    pub event: ChangeEvent,
    pub transition: Option<FieldTransition>,
}

/// A [`ChangeSink`] that keeps every call for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<RecordedChange>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedChange> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangeSink for RecordingSink {
    fn on_change(&self, route: &str, event: &ChangeEvent, transition: Option<&FieldTransition>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedChange {
                route: route.to_string(),
                event: event.clone(),
                transition: transition.cloned(),
            });
        }
    }
}
