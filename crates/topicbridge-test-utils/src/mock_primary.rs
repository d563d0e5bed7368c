// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock primary-network transport for deterministic testing.
//!
//! `MockPrimary` captures every outbound call and can be told to fail the
//! next N sends, downloads, or read acknowledgements.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use topicbridge_core::types::{
    AdapterType, HealthStatus, MediaDescriptor, Network, OutboundContent, PresenceState,
    PrimaryRef, ReadKey,
};
use topicbridge_core::{BridgeError, PluginAdapter, PrimaryTransport};

/// One captured `send_message` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPrimary {
    pub conversation_id: String,
    pub content: OutboundContent,
    pub quoted: Option<PrimaryRef>,
}

impl SentPrimary {
    /// Text of a text send, or the caption of a media send.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            OutboundContent::Text(text) => Some(text),
            OutboundContent::Media { caption, .. } => caption.as_deref(),
        }
    }
}

/// A mock primary transport.
#[derive(Default)]
pub struct MockPrimary {
    sent: Arc<Mutex<Vec<SentPrimary>>>,
    reads: Arc<Mutex<Vec<Vec<ReadKey>>>>,
    presence: Arc<Mutex<Vec<(String, PresenceState)>>>,
    media: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    next_id: AtomicU64,
    send_failures: AtomicUsize,
    download_failures: AtomicUsize,
    read_failures: AtomicUsize,
    presence_failures: AtomicUsize,
    send_attempts: AtomicUsize,
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn injected(what: &str) -> BridgeError {
    BridgeError::transport(Network::Primary, format!("injected {what} failure"))
}

impl MockPrimary {
    /// Create a mock with no media and no injected failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `download_media` return `data` for descriptors with this source id.
    pub async fn add_media(&self, source_id: &str, data: Vec<u8>) {
        self.media.lock().await.insert(source_id.to_string(), data);
    }

    /// Fail the next `n` calls to `send_message`.
    pub fn fail_next_sends(&self, n: usize) {
        self.send_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `download_media`.
    pub fn fail_next_downloads(&self, n: usize) {
        self.download_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `read_messages`.
    pub fn fail_next_reads(&self, n: usize) {
        self.read_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `send_presence`.
    pub fn fail_next_presence(&self, n: usize) {
        self.presence_failures.store(n, Ordering::SeqCst);
    }

    /// Successful sends, in call order.
    pub async fn sent_messages(&self) -> Vec<SentPrimary> {
        self.sent.lock().await.clone()
    }

    /// Number of `send_message` calls, failed ones included.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    /// Every successful `read_messages` batch.
    pub async fn read_batches(&self) -> Vec<Vec<ReadKey>> {
        self.reads.lock().await.clone()
    }

    /// Every successful presence update.
    pub async fn presence_updates(&self) -> Vec<(String, PresenceState)> {
        self.presence.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockPrimary {
    fn name(&self) -> &str {
        "mock-primary"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::PrimaryTransport
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}

#[async_trait]
impl PrimaryTransport for MockPrimary {
    async fn send_message(
        &self,
        conversation_id: &str,
        content: OutboundContent,
        quoted: Option<&PrimaryRef>,
    ) -> Result<String, BridgeError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.send_failures) {
            return Err(injected("send"));
        }
        self.sent.lock().await.push(SentPrimary {
            conversation_id: conversation_id.to_string(),
            content,
            quoted: quoted.cloned(),
        });
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("MOCK{id:04}"))
    }

    async fn download_media(&self, descriptor: &MediaDescriptor) -> Result<Vec<u8>, BridgeError> {
        if take_failure(&self.download_failures) {
            return Err(injected("download"));
        }
        self.media
            .lock()
            .await
            .get(&descriptor.source_id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound {
                kind: "media".into(),
                key: descriptor.source_id.clone(),
            })
    }

    async fn read_messages(&self, keys: &[ReadKey]) -> Result<(), BridgeError> {
        if take_failure(&self.read_failures) {
            return Err(injected("read"));
        }
        self.reads.lock().await.push(keys.to_vec());
        Ok(())
    }

    async fn send_presence(
        &self,
        conversation_id: &str,
        state: PresenceState,
    ) -> Result<(), BridgeError> {
        if take_failure(&self.presence_failures) {
            return Err(injected("presence"));
        }
        self.presence
            .lock()
            .await
            .push((conversation_id.to_string(), state));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let primary = MockPrimary::new();
        primary.fail_next_sends(1);

        let first = primary
            .send_message("a@s.whatsapp.net", OutboundContent::Text("hi".into()), None)
            .await;
        assert!(first.is_err());

        let second = primary
            .send_message("a@s.whatsapp.net", OutboundContent::Text("hi".into()), None)
            .await
            .unwrap();
        assert_eq!(second, "MOCK0001");
        assert_eq!(primary.send_attempts(), 2);
        assert_eq!(primary.sent_messages().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_media_is_not_found() {
        let primary = MockPrimary::new();
        let descriptor = MediaDescriptor {
            source_id: "missing".into(),
            kind: topicbridge_core::types::MediaKind::Image,
            mime_type: None,
            file_name: None,
            voice_note: false,
        };
        assert!(matches!(
            primary.download_media(&descriptor).await,
            Err(BridgeError::NotFound { .. })
        ));
    }
}
