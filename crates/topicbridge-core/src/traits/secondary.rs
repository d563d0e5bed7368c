// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secondary-platform transport contract.

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MediaUpload, SecondaryTarget};

/// Outbound operations the bridge needs from the topic-based platform client.
#[async_trait]
pub trait SecondaryTransport: PluginAdapter {
    /// Sends a text message. Returns the secondary message id.
    async fn send_text(&self, target: SecondaryTarget, text: &str) -> Result<i64, BridgeError>;

    /// Uploads media using the method named in `upload`. Returns the message id.
    async fn send_media(
        &self,
        target: SecondaryTarget,
        upload: MediaUpload,
    ) -> Result<i64, BridgeError>;

    /// Creates a forum topic and returns its thread id.
    async fn create_topic(&self, chat_id: i64, name: &str) -> Result<i64, BridgeError>;

    /// Performs a benign call scoped to a topic to learn whether it still exists.
    ///
    /// Implementations surface the platform's error unchanged so callers can
    /// classify it with [`BridgeError::is_missing_topic`].
    async fn probe_topic(&self, chat_id: i64, thread_id: i64) -> Result<(), BridgeError>;

    /// Downloads a file previously posted on the platform.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, BridgeError>;
}
