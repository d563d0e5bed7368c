// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media handling for Telegram messages.
//!
//! Incoming media is described lazily: the bridge receives a
//! [`MediaDescriptor`] holding the Telegram file id and only downloads the
//! bytes when the relay job runs.

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, Message};
use topicbridge_core::error::BridgeError;
use topicbridge_core::types::{MediaDescriptor, MediaKind, MessageBody, Network};
use tracing::debug;

/// Downloads a file from Telegram servers by its file id.
///
/// Uses the Bot API's `getFile` to resolve the file path, then downloads
/// the file content as bytes.
pub async fn download_file(bot: &Bot, file_id: &str) -> Result<Vec<u8>, BridgeError> {
    let file = bot
        .get_file(FileId(file_id.to_string()))
        .await
        .map_err(|e| BridgeError::Transport {
            network: Network::Secondary,
            message: format!("failed to get file info: {e}"),
            source: Some(Box::new(e)),
        })?;

    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| BridgeError::Transport {
            network: Network::Secondary,
            message: format!("failed to download file: {e}"),
            source: Some(Box::new(e)),
        })?;

    debug!(file_id, size = buf.len(), "downloaded file from Telegram");
    Ok(buf)
}

/// Extracts the bridge-level body of a message.
///
/// Returns `None` for service messages and content the bridge does not relay.
pub fn extract_body(msg: &Message) -> Option<MessageBody> {
    if let Some(text) = msg.text() {
        return Some(MessageBody::Text {
            text: text.to_string(),
        });
    }

    let descriptor = extract_descriptor(msg)?;
    Some(MessageBody::Media {
        descriptor,
        caption: msg.caption().map(str::to_string),
    })
}

fn extract_descriptor(msg: &Message) -> Option<MediaDescriptor> {
    // Telegram provides multiple photo sizes; the last one is the largest.
    if let Some(largest) = msg.photo().and_then(|p| p.last()) {
        return Some(descriptor(
            largest.file.id.to_string(),
            MediaKind::Image,
            Some("image/jpeg".into()),
            None,
        ));
    }

    if let Some(voice) = msg.voice() {
        let mut d = descriptor(
            voice.file.id.to_string(),
            MediaKind::Audio,
            Some(
                voice
                    .mime_type
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "audio/ogg".into()),
            ),
            None,
        );
        d.voice_note = true;
        return Some(d);
    }

    if let Some(audio) = msg.audio() {
        return Some(descriptor(
            audio.file.id.to_string(),
            MediaKind::Audio,
            audio.mime_type.as_ref().map(|m| m.to_string()),
            audio.file_name.clone(),
        ));
    }

    if let Some(video) = msg.video() {
        return Some(descriptor(
            video.file.id.to_string(),
            MediaKind::Video,
            video.mime_type.as_ref().map(|m| m.to_string()),
            video.file_name.clone(),
        ));
    }

    if let Some(animation) = msg.animation() {
        return Some(descriptor(
            animation.file.id.to_string(),
            MediaKind::Video,
            animation.mime_type.as_ref().map(|m| m.to_string()),
            animation.file_name.clone(),
        ));
    }

    if let Some(note) = msg.video_note() {
        return Some(descriptor(
            note.file.id.to_string(),
            MediaKind::Video,
            Some("video/mp4".into()),
            None,
        ));
    }

    if let Some(sticker) = msg.sticker() {
        return Some(descriptor(
            sticker.file.id.to_string(),
            MediaKind::Sticker,
            Some("image/webp".into()),
            None,
        ));
    }

    if let Some(doc) = msg.document() {
        return Some(descriptor(
            doc.file.id.to_string(),
            MediaKind::Document,
            doc.mime_type.as_ref().map(|m| m.to_string()),
            doc.file_name.clone(),
        ));
    }

    None
}

fn descriptor(
    source_id: String,
    kind: MediaKind,
    mime_type: Option<String>,
    file_name: Option<String>,
) -> MediaDescriptor {
    MediaDescriptor {
        source_id,
        kind,
        mime_type,
        file_name,
        voice_note: false,
    }
}
