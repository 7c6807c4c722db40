// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the LiveSync configuration system.

use livesync_config::diagnostic::ConfigError;
use livesync_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_livesync_config() {
    let toml = r#"
[agent]
name = "crm-dashboard"
log_level = "debug"

[realtime]
url = "https://abc.supabase.co"
api_key = "anon-key"
use_supabase = true
join_timeout_secs = 5

[realtime.features]
submissions = true
deals = false

[realtime.reconnect]
max_attempts = 3
base_delay_ms = 250

[cache]
refetch_retries = 0

[notifications]
capacity = 20

[sync]
interval_secs = 60

[[routes]]
name = "organizations-changes"
table = "organizations"
list_keys = ["organizations"]
detail_key = "organization"

[routes.notify]
insert_title = "New Organization"
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.agent.name, "crm-dashboard");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.realtime.url.as_deref(), Some("https://abc.supabase.co"));
    assert!(config.realtime.use_supabase);
    assert_eq!(config.realtime.join_timeout_secs, 5);
    assert!(config.realtime.features.submissions);
    assert!(!config.realtime.features.deals);
    assert!(config.realtime.features.presence);
    assert_eq!(config.realtime.reconnect.max_attempts, 3);
    assert_eq!(config.realtime.reconnect.base_delay_ms, 250);
    assert_eq!(config.realtime.reconnect.max_delay_ms, 30_000);
    assert_eq!(config.cache.refetch_retries, 0);
    assert_eq!(config.notifications.capacity, 20);
    assert_eq!(config.sync.interval_secs, 60);
    assert!(config.realtime_enabled());

    assert_eq!(config.routes.len(), 1);
    let route = &config.routes[0];
    assert_eq!(route.table, "organizations");
    assert_eq!(route.schema, "public");
    assert_eq!(route.id_column, "id");
    assert_eq!(route.tracked_fields, vec!["status", "stage"]);
    let notify = route.notify.as_ref().expect("notify section");
    assert_eq!(notify.insert_title.as_deref(), Some("New Organization"));
    assert_eq!(notify.urgent_title, "Urgent Activity");
    assert_eq!(notify.urgent_value, "urgent");
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.agent.name, "livesync");
    assert_eq!(config.agent.log_level, "info");
    assert!(config.realtime.url.is_none());
    assert!(!config.realtime.use_supabase);
    assert_eq!(config.realtime.heartbeat_interval_secs, 25);
    assert_eq!(config.realtime.reconnect.max_attempts, 0);
    assert_eq!(config.cache.refetch_retries, 1);
    assert_eq!(config.notifications.capacity, 50);
    assert_eq!(config.presence.heartbeat_secs, 30);
    assert_eq!(config.sync.interval_secs, 300);
    assert!(config.routes.is_empty());
}

/// Realtime views stay off unless both the flag and the toggle are set.
#[test]
fn realtime_gating_requires_flag_and_toggle() {
    let toggle_only = load_config_from_str("[realtime]\nuse_supabase = true\n[realtime.features]\nsubmissions = false\n")
        .expect("valid");
    assert!(!toggle_only.realtime_enabled());

    let flag_only = load_config_from_str("[realtime.features]\nsubmissions = true\n").expect("valid");
    assert!(!flag_only.realtime_enabled());
}

/// An unknown key yields a diagnostic with a suggestion and a source span.
#[test]
fn unknown_key_produces_suggestion_with_span() {
    let toml = "[realtime]\nuse_supabse = true\n";
    let errors = load_and_validate_str(toml).expect_err("should reject unknown key");

    let unknown = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey {
                key,
                suggestion,
                span,
                ..
            } => Some((key.clone(), suggestion.clone(), *span)),
            _ => None,
        })
        .expect("unknown key diagnostic");

    assert_eq!(unknown.0, "use_supabse");
    assert_eq!(unknown.1.as_deref(), Some("use_supabase"));
    assert!(unknown.2.is_some(), "inline source should be spanned");
}

/// Wrong value types are reported as InvalidType.
#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[notifications]\ncapacity = \"many\"\n")
        .expect_err("should reject string capacity");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("capacity")))
    );
}

/// A route without its required table is reported as missing.
#[test]
fn route_without_table_is_missing_key() {
    let errors = load_and_validate_str("[[routes]]\nname = \"x\"\n").expect_err("table required");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::MissingKey { key } if key.ends_with("table")))
    );
}

/// Validation collects every problem instead of failing fast.
#[test]
fn validation_collects_all_errors() {
    let toml = r#"
[notifications]
capacity = 0

[sync]
interval_secs = 0
"#;
    let errors = load_and_validate_str(toml).expect_err("two validation errors");
    let count = errors
        .iter()
        .filter(|e| matches!(e, ConfigError::Validation { .. }))
        .count();
    assert_eq!(count, 2);
}
