// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media relay: download from the origin network, re-upload to the other.
//!
//! Any failure on the way degrades to a plain-text message carrying the
//! caption, except a missing destination topic, which is returned so the
//! caller can recreate the topic.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use topicbridge_core::types::{
    MediaDescriptor, MediaKind, MediaUpload, OutboundContent, PrimaryRef, SecondaryMethod,
    SecondaryTarget,
};
use topicbridge_core::{BridgeError, Network, PrimaryTransport, SecondaryTransport};

use crate::recording;

/// Converts audio into the secondary platform's voice-note format.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns OGG/Opus bytes for `input`.
    async fn to_voice(&self, input: &[u8]) -> Result<Vec<u8>, BridgeError>;
}

/// Transcoder that shells out to `ffmpeg`.
///
/// Input and output live in temp files that are removed when the call
/// returns, whether or not the conversion succeeded.
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

fn media_error(message: impl Into<String>, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> BridgeError {
    BridgeError::Media {
        message: message.into(),
        source: Some(source.into()),
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_voice(&self, input: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let input_file = tempfile::Builder::new()
            .prefix("topicbridge-in-")
            .tempfile()
            .map_err(|e| media_error("failed to create transcode input", e))?;
        let output_file = tempfile::Builder::new()
            .prefix("topicbridge-out-")
            .suffix(".ogg")
            .tempfile()
            .map_err(|e| media_error("failed to create transcode output", e))?;

        tokio::fs::write(input_file.path(), input)
            .await
            .map_err(|e| media_error("failed to write transcode input", e))?;

        let output = tokio::process::Command::new(&self.ffmpeg_path)
            .arg("-y")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(input_file.path())
            .args(["-c:a", "libopus", "-b:a", "32k", "-vbr", "on", "-f", "ogg"])
            .arg(output_file.path())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| media_error(format!("failed to run {}", self.ffmpeg_path.display()), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BridgeError::Media {
                message: format!(
                    "ffmpeg exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
                source: None,
            });
        }

        tokio::fs::read(output_file.path())
            .await
            .map_err(|e| media_error("failed to read transcode output", e))
    }
}

/// Where a relayed media item goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayDestination {
    Secondary(SecondaryTarget),
    Primary {
        conversation_id: String,
        quoted: Option<PrimaryRef>,
    },
}

/// Id of the message that landed on the destination network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveredMessage {
    Secondary(i64),
    Primary(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReceipt {
    pub delivered: DeliveredMessage,
    /// The media could not be relayed and its caption went out as text.
    pub fell_back: bool,
}

pub struct MediaRelay {
    primary: Arc<dyn PrimaryTransport>,
    secondary: Arc<dyn SecondaryTransport>,
    transcoder: Option<Arc<dyn Transcoder>>,
}

impl MediaRelay {
    /// `transcoder` is `None` when voice transcoding is disabled; voice
    /// notes are then sent as plain audio.
    pub fn new(
        primary: Arc<dyn PrimaryTransport>,
        secondary: Arc<dyn SecondaryTransport>,
        transcoder: Option<Arc<dyn Transcoder>>,
    ) -> Self {
        Self {
            primary,
            secondary,
            transcoder,
        }
    }

    /// Relays one media item from `origin` to `destination`.
    pub async fn relay(
        &self,
        origin: Network,
        descriptor: &MediaDescriptor,
        caption: Option<&str>,
        destination: RelayDestination,
    ) -> Result<RelayReceipt, BridgeError> {
        let attempt = async {
            let data = self.download(origin, descriptor).await?;
            self.upload(descriptor, data, caption, &destination).await
        };
        match attempt.await {
            Ok(delivered) => Ok(RelayReceipt {
                delivered,
                fell_back: false,
            }),
            Err(e) if e.is_missing_topic() => Err(e),
            Err(e) => {
                warn!(
                    kind = %descriptor.kind,
                    source_id = %descriptor.source_id,
                    error = %e,
                    "media relay failed; sending caption as text"
                );
                recording::record_media_fallback(&descriptor.kind.to_string());
                let text = fallback_text(descriptor.kind, caption);
                let delivered = self.send_text(&destination, &text).await?;
                Ok(RelayReceipt {
                    delivered,
                    fell_back: true,
                })
            }
        }
    }

    async fn download(
        &self,
        origin: Network,
        descriptor: &MediaDescriptor,
    ) -> Result<Vec<u8>, BridgeError> {
        let data = match origin {
            Network::Primary => self.primary.download_media(descriptor).await?,
            Network::Secondary => self.secondary.download_file(&descriptor.source_id).await?,
        };
        debug!(kind = %descriptor.kind, bytes = data.len(), "media downloaded");
        Ok(data)
    }

    async fn upload(
        &self,
        descriptor: &MediaDescriptor,
        data: Vec<u8>,
        caption: Option<&str>,
        destination: &RelayDestination,
    ) -> Result<DeliveredMessage, BridgeError> {
        match destination {
            RelayDestination::Secondary(target) => {
                let upload = self.secondary_upload(descriptor, data, caption).await;
                let id = self.secondary.send_media(*target, upload).await?;
                Ok(DeliveredMessage::Secondary(id))
            }
            RelayDestination::Primary {
                conversation_id,
                quoted,
            } => {
                let content = OutboundContent::Media {
                    kind: descriptor.kind,
                    data,
                    mime_type: descriptor.mime_type.clone(),
                    file_name: descriptor.file_name.clone(),
                    caption: caption.map(str::to_string),
                    voice_note: descriptor.voice_note,
                };
                let id = self
                    .primary
                    .send_message(conversation_id, content, quoted.as_ref())
                    .await?;
                Ok(DeliveredMessage::Primary(id))
            }
        }
    }

    async fn secondary_upload(
        &self,
        descriptor: &MediaDescriptor,
        data: Vec<u8>,
        caption: Option<&str>,
    ) -> MediaUpload {
        let mut method = secondary_method(descriptor);
        let mut data = data;
        let mut file_name = descriptor
            .file_name
            .clone()
            .unwrap_or_else(|| default_file_name(descriptor));

        if method == SecondaryMethod::Voice && !is_ogg(descriptor.mime_type.as_deref()) {
            match &self.transcoder {
                Some(transcoder) => match transcoder.to_voice(&data).await {
                    Ok(voice) => {
                        data = voice;
                        file_name = "voice.ogg".to_string();
                    }
                    Err(e) => {
                        warn!(error = %e, "voice transcode failed; sending as audio");
                        method = SecondaryMethod::Audio;
                    }
                },
                None => method = SecondaryMethod::Audio,
            }
        }

        MediaUpload {
            method,
            data,
            file_name,
            caption: caption.map(str::to_string),
        }
    }

    async fn send_text(
        &self,
        destination: &RelayDestination,
        text: &str,
    ) -> Result<DeliveredMessage, BridgeError> {
        match destination {
            RelayDestination::Secondary(target) => self
                .secondary
                .send_text(*target, text)
                .await
                .map(DeliveredMessage::Secondary),
            RelayDestination::Primary {
                conversation_id,
                quoted,
            } => self
                .primary
                .send_message(
                    conversation_id,
                    OutboundContent::Text(text.to_string()),
                    quoted.as_ref(),
                )
                .await
                .map(DeliveredMessage::Primary),
        }
    }
}

/// Secondary send method for a media item, before any transcoding.
pub fn secondary_method(descriptor: &MediaDescriptor) -> SecondaryMethod {
    match descriptor.kind {
        MediaKind::Image => SecondaryMethod::Photo,
        MediaKind::Video => SecondaryMethod::Video,
        MediaKind::Audio if descriptor.voice_note => SecondaryMethod::Voice,
        MediaKind::Audio => SecondaryMethod::Audio,
        MediaKind::Document => SecondaryMethod::Document,
        MediaKind::Sticker => SecondaryMethod::Sticker,
    }
}

/// Text sent in place of media that could not be relayed.
pub fn fallback_text(kind: MediaKind, caption: Option<&str>) -> String {
    match caption.map(str::trim) {
        Some(caption) if !caption.is_empty() => caption.to_string(),
        _ => format!("[{kind}]"),
    }
}

fn is_ogg(mime_type: Option<&str>) -> bool {
    mime_type.is_some_and(|m| m.starts_with("audio/ogg"))
}

fn default_file_name(descriptor: &MediaDescriptor) -> String {
    let extension = match descriptor.mime_type.as_deref() {
        Some(mime) => mime
            .split(';')
            .next()
            .and_then(|m| m.split('/').nth(1))
            .map(str::trim)
            .filter(|ext| !ext.is_empty())
            .unwrap_or("bin"),
        None => match descriptor.kind {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
            MediaKind::Audio => "ogg",
            MediaKind::Sticker => "webp",
            MediaKind::Document => "bin",
        },
    };
    format!("{}.{extension}", descriptor.kind)
}
