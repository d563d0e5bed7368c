// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response bodies of the WhatsApp gateway REST API.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use topicbridge_core::types::{MediaKind, OutboundContent, PresenceState, PrimaryRef, ReadKey};

/// `POST /messages` request body.
#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub conversation_id: &'a str,
    #[serde(flatten)]
    pub content: OutboundPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted: Option<QuotedMessage<'a>>,
}

/// Message content in gateway form; media bytes travel base64-encoded.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload {
    Text {
        text: String,
    },
    Media {
        kind: MediaKind,
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        voice_note: bool,
    },
}

impl From<OutboundContent> for OutboundPayload {
    fn from(content: OutboundContent) -> Self {
        match content {
            OutboundContent::Text(text) => Self::Text { text },
            OutboundContent::Media {
                kind,
                data,
                mime_type,
                file_name,
                caption,
                voice_note,
            } => Self::Media {
                kind,
                data: STANDARD.encode(data),
                mime_type,
                file_name,
                caption,
                voice_note,
            },
        }
    }
}

/// Message being replied to.
#[derive(Debug, Serialize)]
pub struct QuotedMessage<'a> {
    pub message_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<&'a str>,
}

impl<'a> From<&'a PrimaryRef> for QuotedMessage<'a> {
    fn from(quoted: &'a PrimaryRef) -> Self {
        Self {
            message_id: &quoted.message_id,
            participant_id: quoted.participant_id.as_deref(),
        }
    }
}

/// `POST /messages` response body.
#[derive(Debug, Deserialize)]
pub struct SendMessageResponse {
    pub id: String,
}

/// `POST /read` request body.
#[derive(Debug, Serialize)]
pub struct ReadRequest<'a> {
    pub keys: &'a [ReadKey],
}

/// `POST /presence` request body.
#[derive(Debug, Serialize)]
pub struct PresenceRequest<'a> {
    pub conversation_id: &'a str,
    pub state: PresenceState,
}

/// `GET /health` response body.
#[derive(Debug, Deserialize)]
pub struct GatewayHealth {
    #[serde(default)]
    pub connected: bool,
}
