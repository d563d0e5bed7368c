// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `topicbridge status` command implementation.
//!
//! Opens the mapping database read-side and prints how many chats, users,
//! contacts, and message pairs the bridge knows about.

use std::io::IsTerminal;

use serde::Serialize;
use topicbridge_config::BridgeConfig;
use topicbridge_core::error::BridgeError;
use topicbridge_core::{MappingKind, MappingStore};
use topicbridge_storage::SqliteMappingStore;

/// Structured status output for `--json` mode.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub database: String,
    pub chats: i64,
    pub users: i64,
    pub contacts: i64,
    pub message_pairs: i64,
}

impl StatusResponse {
    fn from_counts(database: &str, counts: &[(String, i64)]) -> Self {
        let count = |kind: MappingKind| {
            counts
                .iter()
                .find(|(k, _)| *k == kind.to_string())
                .map(|(_, n)| *n)
                .unwrap_or(0)
        };
        Self {
            database: database.to_string(),
            chats: count(MappingKind::Chat),
            users: count(MappingKind::User),
            contacts: count(MappingKind::Contact),
            message_pairs: count(MappingKind::MessagePair),
        }
    }
}

/// Run the `topicbridge status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(config: &BridgeConfig, json: bool, plain: bool) -> Result<(), BridgeError> {
    let store = SqliteMappingStore::new(config.storage.clone());
    store.initialize().await?;
    let counts = store.counts().await;
    store.close().await?;

    let status = StatusResponse::from_counts(&config.storage.database_path, &counts?);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&status, use_color);
    }

    Ok(())
}

/// Print mapping counts with optional colors.
fn print_status(status: &StatusResponse, use_color: bool) {
    println!();
    println!("  topicbridge status");
    println!("  {}", "-".repeat(35));

    if use_color {
        use colored::Colorize;
        println!("    Database: {}", status.database.bold());
    } else {
        println!("    Database: {}", status.database);
    }
    println!("    Topics:         {}", status.chats);
    println!("    Senders:        {}", status.users);
    println!("    Contacts:       {}", status.contacts);
    println!("    Message pairs:  {}", status.message_pairs);
    println!();
}
