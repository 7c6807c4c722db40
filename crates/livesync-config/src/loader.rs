// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./livesync.toml` > `~/.config/livesync/livesync.toml` >
//! `/etc/livesync/livesync.toml` with environment variable overrides via the
//! `LIVESYNC_` prefix, plus the bare `USE_SUPABASE` toggle.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::LiveSyncConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/livesync/livesync.toml";

/// Local config file, relative to the working directory.
pub const LOCAL_CONFIG_PATH: &str = "livesync.toml";

/// User config file under the XDG config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("livesync/livesync.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/livesync/livesync.toml` (system-wide)
/// 3. `~/.config/livesync/livesync.toml` (user XDG config)
/// 4. `./livesync.toml` (local directory)
/// 5. `LIVESYNC_*` environment variables
/// 6. `USE_SUPABASE`
pub fn load_config() -> Result<LiveSyncConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<LiveSyncConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LiveSyncConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LiveSyncConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LiveSyncConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .merge(use_supabase_provider())
        .extract()
}

/// Build the Figment used for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LiveSyncConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
        .merge(use_supabase_provider())
}

/// `LIVESYNC_*` variables mapped onto config sections.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `LIVESYNC_REALTIME_JOIN_TIMEOUT_SECS` must become
/// `realtime.join_timeout_secs`.
pub fn env_provider() -> Env {
    Env::prefixed("LIVESYNC_").map(|key| map_env_key(key.as_str()).into())
}

/// The application-wide `USE_SUPABASE` toggle.
pub fn use_supabase_provider() -> Env {
    Env::raw()
        .only(&["USE_SUPABASE"])
        .map(|_| "realtime.use_supabase".into())
}

/// Map a lowercased, prefix-stripped env key to a dotted config path.
pub fn map_env_key(key: &str) -> String {
    key.replacen("agent_", "agent.", 1)
        .replacen("realtime_features_", "realtime.features.", 1)
        .replacen("realtime_reconnect_", "realtime.reconnect.", 1)
        .replacen("realtime_", "realtime.", 1)
        .replacen("cache_", "cache.", 1)
        .replacen("notifications_", "notifications.", 1)
        .replacen("presence_", "presence.", 1)
        .replacen("sync_", "sync.", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_nested_sections() {
        assert_eq!(map_env_key("agent_log_level"), "agent.log_level");
        assert_eq!(
            map_env_key("realtime_join_timeout_secs"),
            "realtime.join_timeout_secs"
        );
        assert_eq!(
            map_env_key("realtime_features_submissions"),
            "realtime.features.submissions"
        );
        assert_eq!(
            map_env_key("realtime_reconnect_max_attempts"),
            "realtime.reconnect.max_attempts"
        );
        assert_eq!(map_env_key("sync_interval_secs"), "sync.interval_secs");
    }
}
