// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the LiveSync view synchronization layer.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, and diagnostic
//! error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use livesync_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("realtime enabled: {}", config.realtime_enabled());
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{LiveSyncConfig, RouteConfig, RouteNotifyConfig};

use std::path::Path;

use tracing::debug;

/// Load configuration from the XDG hierarchy and validate it.
///
/// On Figment errors, the TOML sources are re-read so diagnostics can point
/// at the offending key.
pub fn load_and_validate() -> Result<LiveSyncConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => validated(config, "xdg"),
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &collect_toml_sources(),
        )),
    }
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<LiveSyncConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => validated(config, &path.display().to_string()),
        Err(err) => {
            let sources = std::fs::read_to_string(path)
                .map(|content| vec![(path.display().to_string(), content)])
                .unwrap_or_default();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<LiveSyncConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => validated(config, "<inline>"),
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

fn validated(config: LiveSyncConfig, source: &str) -> Result<LiveSyncConfig, Vec<ConfigError>> {
    if let Err(errors) = validation::validate_config(&config) {
        debug!(source, errors = errors.len(), "configuration rejected");
        return Err(errors);
    }
    debug!(
        source,
        realtime = config.realtime_enabled(),
        routes = config.routes.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Collect TOML source file contents for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::path::PathBuf::from(loader::SYSTEM_CONFIG_PATH)];
    candidates.extend(loader::user_config_path());
    if let Ok(dir) = std::env::current_dir() {
        candidates.push(dir.join(loader::LOCAL_CONFIG_PATH));
    }

    candidates
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            Some((path.display().to_string(), content))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn loading_logs_the_outcome() {
        assert!(load_and_validate_str("[realtime]\nuse_supabase = true\n").is_ok());
        assert!(logs_contain("configuration loaded"));

        assert!(load_and_validate_str("[notifications]\ncapacity = 0\n").is_err());
        assert!(logs_contain("configuration rejected"));
    }
}
