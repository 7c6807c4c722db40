// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LiveSync - live view synchronization for the CRM dashboard.
//!
//! This is the binary entry point.

mod check;
mod offline;
mod replay;
mod shutdown;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use livesync_config::model::LiveSyncConfig;

/// LiveSync - live view synchronization for the CRM dashboard.
#[derive(Parser, Debug)]
#[command(name = "livesync", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and print a summary.
    Check,
    /// Feed recorded change events through the router and dispatcher.
    Replay {
        /// File with one change event per line.
        file: PathBuf,
        /// Also mount the owner-scoped views for this user.
        #[arg(long)]
        user: Option<String>,
    },
    /// Connect to the realtime backend and log notifications until Ctrl+C.
    Watch {
        /// Also mount the owner-scoped views for this user.
        #[arg(long)]
        user: Option<String>,
    },
}

fn load(path: Option<&PathBuf>) -> LiveSyncConfig {
    let loaded = match path {
        Some(path) => livesync_config::load_and_validate_path(path),
        None => livesync_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            livesync_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Check) => {
            check::print_summary(&config);
            Ok(())
        }
        Some(Commands::Replay { file, user }) => {
            init_tracing(&config.agent.log_level);
            replay::run_replay(&config, &file, user.as_deref())
                .await
                .map(|report| report.print())
        }
        Some(Commands::Watch { user }) => {
            init_tracing(&config.agent.log_level);
            let cancel = shutdown::install_signal_handler();
            watch::run_watch(config, user.as_deref(), cancel).await
        }
        None => {
            println!("livesync: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("livesync: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("livesync={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
