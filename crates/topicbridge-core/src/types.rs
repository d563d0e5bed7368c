// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping documents, neutral event types, and transport payloads.
//!
//! Transport adapters convert their native updates into [`PrimaryEvent`] and
//! [`SecondaryEvent`] at the boundary, so the bridge engine never sees
//! teloxide or gateway shapes.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Conversation id the primary network uses for status broadcasts.
pub const STATUS_BROADCAST_ID: &str = "status@broadcast";

/// Prefix for the synthetic conversation key of a per-sender status topic.
pub const STATUS_KEY_PREFIX: &str = "status:";

/// Which side of the bridge an identifier or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Network {
    /// The end-to-end-encrypted, phone-number-identified network.
    Primary,
    /// The topic-based chat platform.
    Secondary,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the role an adapter plays in the bridge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    PrimaryTransport,
    SecondaryTransport,
    Storage,
}

// --- Mapping documents ---

/// Document kinds held by the mapping store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    Chat,
    User,
    Contact,
    MessagePair,
}

/// A typed mapping document with a natural key.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The store kind this document is filed under.
    const KIND: MappingKind;

    /// The natural key, unique within [`Self::KIND`].
    fn key(&self) -> String;
}

/// Association between a primary conversation and its secondary topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMapping {
    pub primary_conversation_id: String,
    pub secondary_topic_id: i64,
    /// Title the topic was created under; reused when recreating it.
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Document for ChatMapping {
    const KIND: MappingKind = MappingKind::Chat;

    fn key(&self) -> String {
        self.primary_conversation_id.clone()
    }
}

/// Profile of a primary-network sender observed by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub primary_identity_id: String,
    pub display_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub message_count: u64,
}

impl IdentityMapping {
    /// Creates a profile for a sender seen for the first time.
    pub fn first_seen(
        identity_id: &str,
        display_name: &str,
        phone_number: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            primary_identity_id: identity_id.to_string(),
            display_name: display_name.to_string(),
            phone_number,
            first_seen: now,
            message_count: 0,
        }
    }

    /// Records one relayed message. The count only ever grows.
    pub fn record_message(&mut self, display_name: Option<&str>) {
        self.message_count = self.message_count.saturating_add(1);
        if let Some(name) = display_name.filter(|n| !n.trim().is_empty()) {
            self.display_name = name.to_string();
        }
    }
}

impl Document for IdentityMapping {
    const KIND: MappingKind = MappingKind::User;

    fn key(&self) -> String {
        self.primary_identity_id.clone()
    }
}

/// Address-book name for a phone number, last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMapping {
    pub phone_number: String,
    pub display_name: String,
    pub updated_at: DateTime<Utc>,
}

impl Document for ContactMapping {
    const KIND: MappingKind = MappingKind::Contact;

    fn key(&self) -> String {
        self.phone_number.clone()
    }
}

/// Correlation record linking one logical message across both networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePair {
    pub primary_message_id: String,
    pub secondary_chat_id: i64,
    pub secondary_thread_id: i64,
    pub secondary_message_id: i64,
    #[serde(default)]
    pub participant_id: Option<String>,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub mark_read: bool,
}

impl Document for MessagePair {
    const KIND: MappingKind = MappingKind::MessagePair;

    fn key(&self) -> String {
        self.primary_message_id.clone()
    }
}

/// Primary-side coordinates of a correlated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryRef {
    pub message_id: String,
    pub conversation_id: String,
    pub participant_id: Option<String>,
}

/// Secondary-side coordinates of a correlated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecondaryRef {
    pub chat_id: i64,
    pub thread_id: i64,
    pub message_id: i64,
}

/// Returns the synthetic conversation key for a sender's status topic.
pub fn status_conversation_key(sender_id: &str) -> String {
    format!("{STATUS_KEY_PREFIX}{sender_id}")
}

/// Extracts the phone number part of a primary identity (`1000@host` -> `1000`).
pub fn phone_from_identity(identity_id: &str) -> Option<String> {
    let user = identity_id.split('@').next()?;
    let user = user.split(':').next()?;
    (!user.is_empty() && user.chars().all(|c| c.is_ascii_digit())).then(|| user.to_string())
}

// --- Media ---

/// Kinds of media the relay understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

/// Transport-specific handle for downloading a media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Opaque id the origin transport resolves (gateway media id, Telegram file id).
    pub source_id: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Audio recorded as a push-to-talk voice note.
    #[serde(default)]
    pub voice_note: bool,
}

/// Message content as seen by the bridge, independent of transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Text { text: String },
    Media {
        descriptor: MediaDescriptor,
        #[serde(default)]
        caption: Option<String>,
    },
}

impl MessageBody {
    /// Text or caption carried by the message, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Media { caption, .. } => caption.as_deref(),
        }
    }
}

// --- Primary transport events ---

/// Connection state reported by the primary transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// A message observed on the primary network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryMessage {
    pub id: String,
    pub conversation_id: String,
    /// Author identity; the participant in groups and status broadcasts.
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    pub timestamp: DateTime<Utc>,
    pub body: MessageBody,
    #[serde(default)]
    pub quoted_id: Option<String>,
}

impl PrimaryMessage {
    /// Returns `true` for status broadcast updates.
    pub fn is_status(&self) -> bool {
        self.conversation_id == STATUS_BROADCAST_ID
    }

    /// Returns `true` for group conversations.
    pub fn is_group(&self) -> bool {
        self.conversation_id.ends_with("@g.us")
    }
}

/// Closed set of events the primary transport delivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PrimaryEvent {
    Message(PrimaryMessage),
    ConnectionUpdate(ConnectionState),
}

// --- Secondary transport events ---

/// A message posted on the secondary platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryMessage {
    pub chat_id: i64,
    /// Forum thread the message was posted in; `None` for the general topic.
    pub thread_id: Option<i64>,
    pub message_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
    pub body: MessageBody,
    pub reply_to_message_id: Option<i64>,
}

/// An inline-button press on the secondary platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    pub id: String,
    pub chat_id: Option<i64>,
    pub sender_id: i64,
    pub data: String,
}

/// Closed set of events the secondary transport delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryEvent {
    Message(SecondaryMessage),
    Callback(CallbackQuery),
}

// --- Outbound payloads ---

/// Content sent to the primary network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    Text(String),
    Media {
        kind: MediaKind,
        data: Vec<u8>,
        mime_type: Option<String>,
        file_name: Option<String>,
        caption: Option<String>,
        voice_note: bool,
    },
}

/// Key identifying one primary message to acknowledge as read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadKey {
    pub conversation_id: String,
    pub message_id: String,
    #[serde(default)]
    pub participant_id: Option<String>,
}

/// Presence signal sent to the primary network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Available,
    Composing,
    Paused,
}

/// Secondary-platform send method chosen for a media upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SecondaryMethod {
    Photo,
    Video,
    Audio,
    Voice,
    Document,
    Sticker,
}

/// Media upload bound for the secondary platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub method: SecondaryMethod,
    pub data: Vec<u8>,
    pub file_name: String,
    pub caption: Option<String>,
}

/// Reply-threading target for a secondary send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryTarget {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub reply_to: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_kind_uses_snake_case_tags() {
        assert_eq!(MappingKind::MessagePair.to_string(), "message_pair");
        assert_eq!(
            "contact".parse::<MappingKind>().unwrap(),
            MappingKind::Contact
        );
        let json = serde_json::to_string(&MappingKind::User).unwrap();
        assert_eq!(json, "\"user\"");
    }

    #[test]
    fn phone_is_extracted_from_identity() {
        assert_eq!(phone_from_identity("1000@primary").as_deref(), Some("1000"));
        assert_eq!(
            phone_from_identity("4915100:12@s.whatsapp.net").as_deref(),
            Some("4915100")
        );
        assert_eq!(phone_from_identity("status@broadcast"), None);
    }

    #[test]
    fn identity_count_only_grows() {
        let now = Utc::now();
        let mut id = IdentityMapping::first_seen("1000@primary", "Alice", None, now);
        id.record_message(None);
        id.record_message(Some("Alice B."));
        assert_eq!(id.message_count, 2);
        assert_eq!(id.display_name, "Alice B.");
        id.record_message(Some("  "));
        assert_eq!(id.display_name, "Alice B.");
    }

    #[test]
    fn primary_event_json_shape() {
        let event = PrimaryEvent::ConnectionUpdate(ConnectionState::Closed { reason: None });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connection_update");
        assert_eq!(json["payload"]["state"], "closed");
    }

    #[test]
    fn status_messages_are_detected() {
        let msg = PrimaryMessage {
            id: "A1".into(),
            conversation_id: STATUS_BROADCAST_ID.into(),
            sender_id: "1000@primary".into(),
            sender_name: None,
            from_me: false,
            timestamp: Utc::now(),
            body: MessageBody::Text { text: "hi".into() },
            quoted_id: None,
        };
        assert!(msg.is_status());
        assert!(!msg.is_group());
        assert_eq!(status_conversation_key(&msg.sender_id), "status:1000@primary");
    }
}
