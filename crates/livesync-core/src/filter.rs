// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row predicates and change bindings.
//!
//! A binding selects which change events a channel listener receives: an
//! operation spec, a schema-qualified table and an optional equality filter
//! written in the backend's `column=eq.value` form.

use std::fmt;
use std::str::FromStr;

use crate::error::LiveSyncError;
use crate::types::{value_as_key, ChangeEvent, EventSpec, Operation, Row};

/// Default schema for table bindings.
pub const DEFAULT_SCHEMA: &str = "public";

/// An equality predicate over a single column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Returns `true` if `row` carries `column` with exactly this value.
    ///
    /// Rows missing the column never match.
    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column)
            .and_then(value_as_key)
            .is_some_and(|v| v == self.value)
    }
}

impl FromStr for RowFilter {
    type Err = LiveSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, rest) = s
            .split_once('=')
            .ok_or_else(|| LiveSyncError::InvalidFilter(format!("`{s}` has no `=`")))?;
        let value = rest.strip_prefix("eq.").ok_or_else(|| {
            LiveSyncError::InvalidFilter(format!("`{s}` uses an unsupported operator"))
        })?;
        let column = column.trim();
        if column.is_empty() {
            return Err(LiveSyncError::InvalidFilter(format!(
                "`{s}` has an empty column"
            )));
        }
        Ok(Self::eq(column, value))
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// Selects change events for one listener on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeBinding {
    pub event: EventSpec,
    pub schema: String,
    pub table: String,
    pub filter: Option<RowFilter>,
}

impl ChangeBinding {
    /// All operations on `public.<table>`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            event: EventSpec::All,
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.into(),
            filter: None,
        }
    }

    pub fn with_event(mut self, event: EventSpec) -> Self {
        self.event = event;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Returns `true` if `event` is selected by this binding.
    ///
    /// A DELETE whose old image lacks the filter column matches: unless the
    /// table keeps full replica identity the backend only ships the primary
    /// key, and it has already applied the filter.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if !self.event.matches(event.operation) || self.table != event.table {
            return false;
        }
        let Some(filter) = &self.filter else {
            return true;
        };
        match event.row() {
            Some(row) if event.operation == Operation::Delete => {
                !row.contains_key(&filter.column) || filter.matches(row)
            }
            Some(row) => filter.matches(row),
            None => false,
        }
    }
}

impl fmt::Display for ChangeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.event, self.schema, self.table)?;
        if let Some(filter) = &self.filter {
            write!(f, " [{filter}]")?;
        }
        Ok(())
    }
}
