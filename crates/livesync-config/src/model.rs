// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the LiveSync synchronization layer.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level LiveSync configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LiveSyncConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Realtime backend connection and feature gating.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Query cache behavior.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Notification store settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Presence tracking settings.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Offline sync status settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Additional table routes beyond the built-in submission and deal views.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl LiveSyncConfig {
    /// Realtime views run only when the submissions flag and `USE_SUPABASE` are both set.
    pub fn realtime_enabled(&self) -> bool {
        self.realtime.use_supabase && self.realtime.features.submissions
    }
}

/// Process identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "livesync".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Realtime backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    #[serde(default)]
    pub url: Option<String>,

    /// Project API key sent as `apikey` on the socket URL.
    #[serde(default)]
    pub api_key: Option<String>,

    /// User access token sent with channel joins. Falls back to `api_key`.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Environment toggle; mirrors `USE_SUPABASE=true`.
    #[serde(default)]
    pub use_supabase: bool,

    /// Seconds to wait for a join reply before reporting `TIMED_OUT`.
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,

    /// Seconds between socket heartbeats.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Per-channel inbound buffer size.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Feature flags for individual realtime views.
    #[serde(default)]
    pub features: FeatureFlags,

    /// Reconnect policy after `CHANNEL_ERROR` / `TIMED_OUT`.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            access_token: None,
            use_supabase: false,
            join_timeout_secs: default_join_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            channel_buffer: default_channel_buffer(),
            features: FeatureFlags::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

fn default_join_timeout_secs() -> u64 {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    25
}

fn default_channel_buffer() -> usize {
    256
}

/// Feature flags for realtime views.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureFlags {
    /// `realtime.submissions`: master switch for live submission views.
    #[serde(default = "default_true")]
    pub submissions: bool,

    /// Live deal pipeline view.
    #[serde(default = "default_true")]
    pub deals: bool,

    /// Presence rosters.
    #[serde(default = "default_true")]
    pub presence: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            submissions: true,
            deals: true,
            presence: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Bounded retry with exponential backoff for failed channels.
///
/// `max_attempts = 0` leaves failed channels inactive until re-subscribed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    #[serde(default)]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Query cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Extra attempts after a failed refetch before the entry is left stale.
    #[serde(default = "default_refetch_retries")]
    pub refetch_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refetch_retries: default_refetch_retries(),
        }
    }
}

fn default_refetch_retries() -> u32 {
    1
}

/// Notification store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// Maximum notifications retained; oldest are evicted first.
    #[serde(default = "default_notification_capacity")]
    pub capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            capacity: default_notification_capacity(),
        }
    }
}

fn default_notification_capacity() -> usize {
    50
}

/// Presence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceConfig {
    /// Seconds between re-assertions of the client's own record.
    #[serde(default = "default_presence_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_presence_heartbeat_secs(),
        }
    }
}

fn default_presence_heartbeat_secs() -> u64 {
    30
}

/// Offline sync configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Seconds between periodic sync attempts.
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval_secs(),
        }
    }
}

fn default_sync_interval_secs() -> u64 {
    300
}

/// Declares how change events on one table affect cached queries and
/// which notifications they raise.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Unique route name, also used as the channel name.
    pub name: String,

    /// Watched table.
    pub table: String,

    #[serde(default = "default_schema")]
    pub schema: String,

    /// Row predicate in `column=eq.value` form.
    #[serde(default)]
    pub filter: Option<String>,

    /// List query roots invalidated on INSERT/DELETE, e.g. `["submissions"]`.
    #[serde(default)]
    pub list_keys: Vec<String>,

    /// Detail query root patched on UPDATE, e.g. `"submission"` for `['submission', id]`.
    #[serde(default)]
    pub detail_key: Option<String>,

    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Column naming the row owner.
    #[serde(default)]
    pub owner_column: Option<String>,

    /// Owner-scoped list root, e.g. `"userSubmissions"` for `['userSubmissions', owner]`.
    #[serde(default)]
    pub owner_list_key: Option<String>,

    /// Also invalidate list queries on UPDATE.
    #[serde(default)]
    pub invalidate_lists_on_update: bool,

    /// Columns whose value changes are reported as transitions.
    #[serde(default = "default_tracked_fields")]
    pub tracked_fields: Vec<String>,

    /// Notification copy and priority rules. `None` raises no notifications.
    #[serde(default)]
    pub notify: Option<RouteNotifyConfig>,
}

impl RouteConfig {
    /// A route with no cache effects and no notifications.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            schema: default_schema(),
            filter: None,
            list_keys: Vec::new(),
            detail_key: None,
            id_column: default_id_column(),
            owner_column: None,
            owner_list_key: None,
            invalidate_lists_on_update: false,
            tracked_fields: default_tracked_fields(),
            notify: None,
        }
    }

    /// Team-wide live submission list: every row of the pipeline table.
    pub fn submissions() -> Self {
        Self {
            list_keys: vec!["submissions".to_string()],
            detail_key: Some("submission".to_string()),
            notify: Some(RouteNotifyConfig {
                insert_title: Some("New Submission".to_string()),
                update_title: Some("Lead Status Updated".to_string()),
                ..RouteNotifyConfig::default()
            }),
            ..Self::new("submissions-changes", "deals")
        }
    }

    /// One rep's submissions: the pipeline table filtered by owner.
    pub fn user_submissions(user_id: &str) -> Self {
        Self {
            filter: Some(format!("owner_id=eq.{user_id}")),
            detail_key: Some("submission".to_string()),
            owner_column: Some("owner_id".to_string()),
            owner_list_key: Some("userSubmissions".to_string()),
            invalidate_lists_on_update: true,
            notify: Some(RouteNotifyConfig {
                insert_title: None,
                update_title: Some("Your Lead Updated".to_string()),
                ..RouteNotifyConfig::default()
            }),
            ..Self::new(format!("user-submissions-{user_id}"), "deals")
        }
    }

    /// Deal pipeline board.
    pub fn deals() -> Self {
        Self {
            list_keys: vec!["deals".to_string()],
            detail_key: Some("deal".to_string()),
            notify: Some(RouteNotifyConfig {
                insert_title: None,
                update_title: Some("Deal Stage Changed".to_string()),
                ..RouteNotifyConfig::default()
            }),
            ..Self::new("deals-changes", "deals")
        }
    }
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_tracked_fields() -> Vec<String> {
    vec!["status".to_string(), "stage".to_string()]
}

/// Notification rules for a route.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteNotifyConfig {
    /// Title for informational INSERT notifications. `None` skips them.
    #[serde(default)]
    pub insert_title: Option<String>,

    /// Title for tracked-field UPDATE notifications. `None` skips them.
    #[serde(default)]
    pub update_title: Option<String>,

    /// Title for top-priority INSERT notifications.
    #[serde(default = "default_urgent_title")]
    pub urgent_title: String,

    /// Columns tried in order to name the row in messages.
    #[serde(default = "default_display_fields")]
    pub display_fields: Vec<String>,

    /// Column carrying the priority tier.
    #[serde(default = "default_priority_field")]
    pub priority_field: String,

    /// Value of `priority_field` that marks the highest tier.
    #[serde(default = "default_urgent_value")]
    pub urgent_value: String,
}

impl Default for RouteNotifyConfig {
    fn default() -> Self {
        Self {
            insert_title: None,
            update_title: None,
            urgent_title: default_urgent_title(),
            display_fields: default_display_fields(),
            priority_field: default_priority_field(),
            urgent_value: default_urgent_value(),
        }
    }
}

fn default_urgent_title() -> String {
    "Urgent Activity".to_string()
}

fn default_display_fields() -> Vec<String> {
    vec![
        "contact_name".to_string(),
        "company_name".to_string(),
        "name".to_string(),
    ]
}

fn default_priority_field() -> String {
    "priority".to_string()
}

fn default_urgent_value() -> String {
    "urgent".to_string()
}
