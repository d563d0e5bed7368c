// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! topicbridge - relays WhatsApp conversations into Telegram forum topics.
//!
//! This is the binary entry point for the bridge.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use topicbridge_config::{BridgeConfig, ConfigError};

/// topicbridge - one Telegram forum topic per WhatsApp conversation.
#[derive(Parser, Debug)]
#[command(name = "topicbridge", version, about, long_about = None)]
struct Cli {
    /// Explicit config file instead of the XDG lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the bridge.
    Serve,
    /// Show mapping counts from the database.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<BridgeConfig, Vec<ConfigError>> {
    match path {
        Some(path) => topicbridge_config::load_and_validate_path(path),
        None => topicbridge_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            topicbridge_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain).await,
        Some(Commands::CheckConfig) => {
            println!(
                "topicbridge: config OK (forum chat: {}, database: {})",
                config
                    .telegram
                    .chat_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "unset".into()),
                config.storage.database_path
            );
            Ok(())
        }
        None => {
            println!("topicbridge: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
