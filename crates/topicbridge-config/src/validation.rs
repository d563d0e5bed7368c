// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as socket addresses, non-zero retry budgets, and URL schemes.

use crate::diagnostic::ConfigError;
use crate::model::BridgeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns all collected errors instead of failing on the first one.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.bridge.log_level.as_str()) {
        fail(format!(
            "bridge.log_level `{}` must be one of {}",
            config.bridge.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.queue.max_retries == 0 {
        fail("queue.max_retries must be at least 1".to_string());
    }

    // 2^(max_retries-1) must not overflow the backoff computation.
    if config.queue.max_retries > 16 {
        fail(format!(
            "queue.max_retries must be at most 16, got {}",
            config.queue.max_retries
        ));
    }

    if config.queue.dead_letter_capacity == 0 {
        fail("queue.dead_letter_capacity must be at least 1".to_string());
    }

    if config.cache.topic_ttl_secs == 0 {
        fail("cache.topic_ttl_secs must be at least 1".to_string());
    }

    if config.retention.message_pair_days == 0 {
        fail("retention.message_pair_days must be at least 1".to_string());
    }

    if config.retention.sweep_interval_secs == 0 {
        fail("retention.sweep_interval_secs must be at least 1".to_string());
    }

    if let Some(token) = &config.telegram.bot_token
        && token.trim().is_empty()
    {
        fail("telegram.bot_token must not be empty when set".to_string());
    }

    if config.telegram.bot_token.is_some() && config.telegram.chat_id.is_none() {
        fail("telegram.chat_id is required when telegram.bot_token is set".to_string());
    }

    let url = config.whatsapp.gateway_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        fail(format!(
            "whatsapp.gateway_url `{url}` must start with http:// or https://"
        ));
    }

    if config
        .whatsapp
        .webhook_bind
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        fail(format!(
            "whatsapp.webhook_bind `{}` is not a valid socket address",
            config.whatsapp.webhook_bind
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.media.ffmpeg_path.trim().is_empty() {
        fail("media.ffmpeg_path must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
