// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Primary-network transport contract.

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MediaDescriptor, OutboundContent, PresenceState, PrimaryRef, ReadKey};

/// Outbound operations the bridge needs from the primary-network client.
///
/// Connection handling, pairing, and encryption live behind this trait; the
/// event stream is delivered separately as [`PrimaryEvent`](crate::types::PrimaryEvent)s.
#[async_trait]
pub trait PrimaryTransport: PluginAdapter {
    /// Sends content into a conversation, optionally quoting an earlier message.
    ///
    /// Returns the primary-network id of the sent message.
    async fn send_message(
        &self,
        conversation_id: &str,
        content: OutboundContent,
        quoted: Option<&PrimaryRef>,
    ) -> Result<String, BridgeError>;

    /// Downloads and decrypts the media referenced by `descriptor`.
    async fn download_media(&self, descriptor: &MediaDescriptor) -> Result<Vec<u8>, BridgeError>;

    /// Acknowledges the given messages as read.
    async fn read_messages(&self, keys: &[ReadKey]) -> Result<(), BridgeError>;

    /// Publishes a presence signal into a conversation.
    async fn send_presence(
        &self,
        conversation_id: &str,
        state: PresenceState,
    ) -> Result<(), BridgeError>;
}
