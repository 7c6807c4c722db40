// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as parseable row filters, unique route names and positive intervals.

use std::collections::HashSet;

use livesync_core::RowFilter;

use crate::diagnostic::ConfigError;
use crate::model::{LiveSyncConfig, RouteConfig};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &LiveSyncConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if let Some(url) = &config.realtime.url
        && !(url.starts_with("http://")
            || url.starts_with("https://")
            || url.starts_with("ws://")
            || url.starts_with("wss://"))
    {
        errors.push(ConfigError::validation(format!(
            "realtime.url `{url}` must start with http://, https://, ws:// or wss://"
        )));
    }

    if config.realtime.join_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "realtime.join_timeout_secs must be at least 1",
        ));
    }

    if config.realtime.heartbeat_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "realtime.heartbeat_interval_secs must be at least 1",
        ));
    }

    if config.realtime.channel_buffer == 0 {
        errors.push(ConfigError::validation(
            "realtime.channel_buffer must be at least 1",
        ));
    }

    let reconnect = &config.realtime.reconnect;
    if reconnect.base_delay_ms > reconnect.max_delay_ms {
        errors.push(ConfigError::validation(format!(
            "realtime.reconnect.base_delay_ms ({}) exceeds max_delay_ms ({})",
            reconnect.base_delay_ms, reconnect.max_delay_ms
        )));
    }

    if config.notifications.capacity == 0 {
        errors.push(ConfigError::validation(
            "notifications.capacity must be at least 1",
        ));
    }

    if config.presence.heartbeat_secs == 0 {
        errors.push(ConfigError::validation(
            "presence.heartbeat_secs must be at least 1",
        ));
    }

    if config.sync.interval_secs == 0 {
        errors.push(ConfigError::validation("sync.interval_secs must be at least 1"));
    }

    let mut seen = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if !seen.insert(route.name.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate route name `{}` in [[routes]]",
                route.name
            )));
        }
        validate_route(i, route, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a single route declaration.
pub fn validate_route(index: usize, route: &RouteConfig, errors: &mut Vec<ConfigError>) {
    if route.name.trim().is_empty() {
        errors.push(ConfigError::validation(format!(
            "routes[{index}].name must not be empty"
        )));
    }

    if route.table.trim().is_empty() {
        errors.push(ConfigError::validation(format!(
            "routes[{index}].table must not be empty"
        )));
    }

    if let Some(filter) = &route.filter
        && let Err(e) = filter.parse::<RowFilter>()
    {
        errors.push(ConfigError::validation(format!("routes[{index}].filter: {e}")));
    }

    if route.detail_key.is_some() && route.id_column.trim().is_empty() {
        errors.push(ConfigError::validation(format!(
            "routes[{index}].id_column must not be empty when detail_key is set"
        )));
    }

    if route.owner_list_key.is_some() && route.owner_column.is_none() {
        errors.push(ConfigError::validation(format!(
            "routes[{index}].owner_list_key requires owner_column"
        )));
    }
}
