// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock forum-topic transport for deterministic testing.
//!
//! `MockSecondary` hands out sequential thread and message ids, records every
//! call, and models deleted topics: sends and probes against a deleted thread
//! fail with the platform's "message thread not found" error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use topicbridge_core::types::{
    AdapterType, HealthStatus, MediaUpload, Network, SecondaryTarget,
};
use topicbridge_core::{BridgeError, PluginAdapter, SecondaryTransport};

/// Error text the platform returns for a deleted forum thread.
pub const THREAD_NOT_FOUND: &str = "Bad Request: message thread not found";

/// One captured outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryCall {
    Text {
        target: SecondaryTarget,
        text: String,
        message_id: i64,
    },
    Media {
        target: SecondaryTarget,
        upload: MediaUpload,
        message_id: i64,
    },
}

impl SecondaryCall {
    pub fn target(&self) -> SecondaryTarget {
        match self {
            Self::Text { target, .. } | Self::Media { target, .. } => *target,
        }
    }

    pub fn message_id(&self) -> i64 {
        match self {
            Self::Text { message_id, .. } | Self::Media { message_id, .. } => *message_id,
        }
    }

    /// Text body, or the caption of a media upload.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            Self::Media { upload, .. } => upload.caption.as_deref(),
        }
    }
}

/// A created topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTopic {
    pub chat_id: i64,
    pub name: String,
    pub thread_id: i64,
}

/// A mock secondary transport.
pub struct MockSecondary {
    calls: Arc<Mutex<Vec<SecondaryCall>>>,
    topics: Arc<Mutex<Vec<CreatedTopic>>>,
    deleted: Arc<Mutex<HashSet<i64>>>,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    probe_error: Arc<Mutex<Option<String>>>,
    next_thread: AtomicI64,
    next_message: AtomicI64,
    send_failures: AtomicUsize,
    probes: AtomicUsize,
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MockSecondary {
    /// Thread ids start at 100 and message ids at 1000.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            topics: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(HashSet::new())),
            files: Arc::new(Mutex::new(HashMap::new())),
            probe_error: Arc::new(Mutex::new(None)),
            next_thread: AtomicI64::new(100),
            next_message: AtomicI64::new(1000),
            send_failures: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }

    /// Mark a thread as deleted by an operator.
    pub async fn delete_topic(&self, thread_id: i64) {
        self.deleted.lock().await.insert(thread_id);
    }

    /// Make every probe fail with `message` (e.g. a transient network error).
    pub async fn set_probe_error(&self, message: Option<&str>) {
        *self.probe_error.lock().await = message.map(str::to_string);
    }

    /// Make `download_file` return `data` for `file_id`.
    pub async fn add_file(&self, file_id: &str, data: Vec<u8>) {
        self.files.lock().await.insert(file_id.to_string(), data);
    }

    /// Fail the next `n` sends (text or media) with a transient error.
    pub fn fail_next_sends(&self, n: usize) {
        self.send_failures.store(n, Ordering::SeqCst);
    }

    /// Every successful send, in call order.
    pub async fn calls(&self) -> Vec<SecondaryCall> {
        self.calls.lock().await.clone()
    }

    /// Successful sends into one thread.
    pub async fn calls_in(&self, thread_id: i64) -> Vec<SecondaryCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.target().thread_id == Some(thread_id))
            .cloned()
            .collect()
    }

    /// Every created topic, in creation order.
    pub async fn created_topics(&self) -> Vec<CreatedTopic> {
        self.topics.lock().await.clone()
    }

    /// Number of `probe_topic` calls.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    async fn check_thread(&self, thread_id: Option<i64>) -> Result<(), BridgeError> {
        if let Some(thread) = thread_id
            && self.deleted.lock().await.contains(&thread)
        {
            return Err(BridgeError::transport(Network::Secondary, THREAD_NOT_FOUND));
        }
        Ok(())
    }

    async fn record(&self, build: impl FnOnce(i64) -> SecondaryCall) -> i64 {
        let id = self.next_message.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().await.push(build(id));
        id
    }
}

impl Default for MockSecondary {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockSecondary {
    fn name(&self) -> &str {
        "mock-secondary"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::SecondaryTransport
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}

#[async_trait]
impl SecondaryTransport for MockSecondary {
    async fn send_text(&self, target: SecondaryTarget, text: &str) -> Result<i64, BridgeError> {
        self.check_thread(target.thread_id).await?;
        if take_failure(&self.send_failures) {
            return Err(BridgeError::transport(
                Network::Secondary,
                "injected send failure",
            ));
        }
        let text = text.to_string();
        Ok(self
            .record(|message_id| SecondaryCall::Text {
                target,
                text,
                message_id,
            })
            .await)
    }

    async fn send_media(
        &self,
        target: SecondaryTarget,
        upload: MediaUpload,
    ) -> Result<i64, BridgeError> {
        self.check_thread(target.thread_id).await?;
        if take_failure(&self.send_failures) {
            return Err(BridgeError::transport(
                Network::Secondary,
                "injected upload failure",
            ));
        }
        Ok(self
            .record(|message_id| SecondaryCall::Media {
                target,
                upload,
                message_id,
            })
            .await)
    }

    async fn create_topic(&self, chat_id: i64, name: &str) -> Result<i64, BridgeError> {
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        let thread_id = self.next_thread.fetch_add(1, Ordering::SeqCst);
        self.topics.lock().await.push(CreatedTopic {
            chat_id,
            name: name.to_string(),
            thread_id,
        });
        Ok(thread_id)
    }

    async fn probe_topic(&self, _chat_id: i64, thread_id: i64) -> Result<(), BridgeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.check_thread(Some(thread_id)).await?;
        if let Some(message) = self.probe_error.lock().await.clone() {
            return Err(BridgeError::transport(Network::Secondary, message));
        }
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, BridgeError> {
        self.files
            .lock()
            .await
            .get(file_id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound {
                kind: "file".into(),
                key: file_id.to_string(),
            })
    }
}
