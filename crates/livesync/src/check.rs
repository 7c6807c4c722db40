// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `livesync check` command implementation.

use livesync_config::model::LiveSyncConfig;

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

/// Human-readable summary of a validated configuration.
pub fn summary(config: &LiveSyncConfig) -> String {
    let realtime = &config.realtime;
    let mut lines = vec![
        format!("agent: {} (log level {})", config.agent.name, config.agent.log_level),
        format!(
            "realtime: {} (use_supabase={}, url={})",
            on_off(config.realtime_enabled()),
            realtime.use_supabase,
            realtime.url.as_deref().unwrap_or("unset"),
        ),
        format!(
            "features: submissions={} deals={} presence={}",
            on_off(realtime.features.submissions),
            on_off(realtime.features.deals),
            on_off(realtime.features.presence),
        ),
        format!(
            "reconnect: {}",
            if realtime.reconnect.max_attempts == 0 {
                "off".to_string()
            } else {
                format!(
                    "{} attempts, {}ms..{}ms",
                    realtime.reconnect.max_attempts,
                    realtime.reconnect.base_delay_ms,
                    realtime.reconnect.max_delay_ms
                )
            }
        ),
        format!(
            "notifications: capacity {}; sync every {}s",
            config.notifications.capacity, config.sync.interval_secs
        ),
    ];
    for route in &config.routes {
        let filter = route
            .filter
            .as_deref()
            .map(|f| format!(" [{f}]"))
            .unwrap_or_default();
        lines.push(format!(
            "route {}: {}.{}{}",
            route.name, route.schema, route.table, filter
        ));
    }
    lines.join("\n")
}

/// Run the `livesync check` command.
pub fn print_summary(config: &LiveSyncConfig) {
    println!("livesync: config OK");
    println!("{}", summary(config));
}
