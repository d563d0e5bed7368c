// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the topicbridge relay.

use thiserror::Error;

use crate::types::Network;

/// Substrings the secondary platform uses when a forum thread no longer exists.
const MISSING_TOPIC_MARKERS: &[&str] = &[
    "message thread not found",
    "thread not found",
    "topic_deleted",
    "topic not found",
    "topic_id_invalid",
];

/// The primary error type used across transports, storage, and the bridge engine.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Mapping store errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport errors from either network (network blip, rate limit, rejected request).
    #[error("{network} transport error: {message}")]
    Transport {
        network: Network,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The secondary-platform topic a mapping points at has been deleted.
    #[error("topic {topic_id} no longer exists")]
    MissingTopic { topic_id: i64 },

    /// A mapping or correlation record was not found.
    #[error("{kind} not found: {key}")]
    NotFound { kind: String, key: String },

    /// Media download, upload, or transcoding failure.
    #[error("media error: {message}")]
    Media {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Document (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(network: Network, message: impl Into<String>) -> Self {
        Self::Transport {
            network,
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a storage error wrapping any error type.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }

    /// Returns `true` when the error means a secondary-platform topic is gone.
    ///
    /// Such errors trigger topic reconciliation instead of a blind retry.
    pub fn is_missing_topic(&self) -> bool {
        match self {
            Self::MissingTopic { .. } => true,
            Self::Transport {
                network: Network::Secondary,
                message,
                ..
            } => is_missing_topic_message(message),
            _ => false,
        }
    }
}

/// Classifies a raw secondary-platform error message as "topic missing".
pub fn is_missing_topic_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    MISSING_TOPIC_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}
