// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./topicbridge.toml` > `~/.config/topicbridge/topicbridge.toml`
//! > `/etc/topicbridge/topicbridge.toml` with environment variable overrides via
//! the `TOPICBRIDGE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::BridgeConfig;

/// Config sections recognized in environment variable names.
const ENV_SECTIONS: &[&str] = &[
    "bridge",
    "telegram",
    "whatsapp",
    "queue",
    "cache",
    "receipts",
    "presence",
    "retention",
    "media",
    "storage",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/topicbridge/topicbridge.toml` (system-wide)
/// 3. `~/.config/topicbridge/topicbridge.toml` (user XDG config)
/// 4. `./topicbridge.toml` (local directory)
/// 5. `TOPICBRIDGE_*` environment variables
pub fn load_config() -> Result<BridgeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::file("/etc/topicbridge/topicbridge.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("topicbridge/topicbridge.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("topicbridge.toml"))
        .merge(env_provider())
}

/// Maps `TOPICBRIDGE_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Uses an explicit section list rather than `Env::split("_")` because keys
/// contain underscores: `TOPICBRIDGE_QUEUE_MAX_RETRIES` must become
/// `queue.max_retries`, not `queue.max.retries`.
fn env_provider() -> Env {
    Env::prefixed("TOPICBRIDGE_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
