// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the topicbridge relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level topicbridge configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Feature flags and logging.
    #[serde(default)]
    pub bridge: BridgeSection,

    /// Telegram forum settings (secondary platform).
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// WhatsApp gateway settings (primary network).
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Delivery queue and retry settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Topic verification cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Read-receipt batching settings.
    #[serde(default)]
    pub receipts: ReceiptConfig,

    /// Presence throttling settings.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Retention of correlation records and dead letters.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Media relay settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Bridge feature flags.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSection {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Relay secondary-platform replies back to the primary network.
    #[serde(default = "default_true")]
    pub bidirectional: bool,

    /// Acknowledge primary messages as read once they are answered in a topic.
    #[serde(default = "default_true")]
    pub read_receipts: bool,

    /// Publish typing presence on the primary network while replying.
    #[serde(default)]
    pub presence: bool,

    /// Bridge status broadcasts into per-sender topics.
    #[serde(default)]
    pub status_sync: bool,

    /// Post a descriptive message into every newly created topic.
    #[serde(default = "default_true")]
    pub welcome_message: bool,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            bidirectional: true,
            read_receipts: true,
            presence: false,
            status_sync: false,
            welcome_message: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Telegram forum configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. `None` disables the Telegram side.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Forum supergroup that hosts one topic per bridged conversation.
    #[serde(default)]
    pub chat_id: Option<i64>,

    /// Telegram user IDs or usernames allowed to reply. Empty allows every member.
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

/// WhatsApp gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Base URL of the WhatsApp Web gateway sidecar.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Bearer token for gateway requests.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Address the webhook listener binds to.
    #[serde(default = "default_webhook_bind")]
    pub webhook_bind: String,

    /// Shared secret for `X-Gateway-Signature` HMAC verification.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Per-request timeout for gateway calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            api_token: None,
            webhook_bind: default_webhook_bind(),
            webhook_secret: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:3010".to_string()
}

fn default_webhook_bind() -> String {
    "127.0.0.1:3011".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Delivery queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Attempts after which an item is dead-lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base; the Nth retry waits `base_delay_ms * 2^(N-1)`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Pause between two processed items, respecting platform rate limits.
    #[serde(default = "default_inter_item_delay_ms")]
    pub inter_item_delay_ms: u64,

    /// Maximum number of dead letters kept for inspection.
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            inter_item_delay_ms: default_inter_item_delay_ms(),
            dead_letter_capacity: default_dead_letter_capacity(),
        }
    }
}

impl QueueConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_inter_item_delay_ms() -> u64 {
    100
}

fn default_dead_letter_capacity() -> usize {
    1000
}

/// Topic verification cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Seconds a topic verification result stays valid.
    #[serde(default = "default_topic_ttl_secs")]
    pub topic_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            topic_ttl_secs: default_topic_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn topic_ttl(&self) -> Duration {
        Duration::from_secs(self.topic_ttl_secs)
    }
}

fn default_topic_ttl_secs() -> u64 {
    300
}

/// Read-receipt batching configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReceiptConfig {
    /// Window during which mark-read requests for one conversation are merged.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: default_batch_window_ms(),
        }
    }
}

impl ReceiptConfig {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }
}

fn default_batch_window_ms() -> u64 {
    2000
}

/// Presence throttling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceConfig {
    /// Minimum spacing between two presence updates for one identity.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl PresenceConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

fn default_min_interval_ms() -> u64 {
    1000
}

/// Retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Days a message pair (and a dead letter) is kept.
    #[serde(default = "default_message_pair_days")]
    pub message_pair_days: u32,

    /// Seconds between two retention sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_pair_days: default_message_pair_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.message_pair_days) * 24 * 60 * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_message_pair_days() -> u32 {
    7
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

/// Media relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Path or name of the ffmpeg executable.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Transcode primary voice notes to OGG/Opus so they play as voice messages.
    #[serde(default = "default_true")]
    pub transcode_voice: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            transcode_voice: true,
        }
    }
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("topicbridge").join("topicbridge.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("topicbridge.db"))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_knobs() {
        let config = BridgeConfig::default();
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.inter_item_delay(), Duration::from_millis(100));
        assert_eq!(config.cache.topic_ttl(), Duration::from_secs(300));
        assert_eq!(config.receipts.batch_window(), Duration::from_secs(2));
        assert_eq!(config.presence.min_interval(), Duration::from_secs(1));
        assert_eq!(config.retention.window(), Duration::from_secs(7 * 86_400));
        assert!(config.bridge.bidirectional);
        assert!(!config.bridge.status_sync);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml_str = r#"
[queue]
max_retries = 5
"#;
        let config: BridgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.queue.max_retries, 5);
        assert_eq!(config.queue.base_delay_ms, 1000);
        assert_eq!(config.queue.dead_letter_capacity, 1000);
    }

    #[test]
    fn unknown_queue_key_is_rejected() {
        let toml_str = r#"
[queue]
max_retrys = 5
"#;
        assert!(toml::from_str::<BridgeConfig>(toml_str).is_err());
    }
}
