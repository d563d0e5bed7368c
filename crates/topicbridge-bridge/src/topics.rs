// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forum topic lifecycle: create on demand, verify, recreate after reconnect.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use topicbridge_core::types::{ChatMapping, SecondaryTarget, STATUS_KEY_PREFIX};
use topicbridge_core::{BridgeError, Clock, SecondaryTransport};

use crate::recording;
use crate::state::BridgeState;
use crate::topic_cache::TopicCache;

/// Forum topic titles are limited to 128 characters.
const MAX_TOPIC_TITLE_CHARS: usize = 128;

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecreateReport {
    pub checked: usize,
    /// `(conversation, old topic, new topic)` for every recreated topic.
    pub recreated: Vec<(String, i64, i64)>,
    pub failed: Vec<String>,
}

pub struct TopicManager {
    secondary: Arc<dyn SecondaryTransport>,
    state: Arc<BridgeState>,
    cache: TopicCache,
    clock: Arc<dyn Clock>,
    chat_id: i64,
    send_welcome: bool,
    creation_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TopicManager {
    pub fn new(
        secondary: Arc<dyn SecondaryTransport>,
        state: Arc<BridgeState>,
        cache: TopicCache,
        clock: Arc<dyn Clock>,
        chat_id: i64,
        send_welcome: bool,
    ) -> Self {
        Self {
            secondary,
            state,
            cache,
            clock,
            chat_id,
            send_welcome,
            creation_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn lock_for(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = match self.creation_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(conversation_id.to_string()).or_default())
    }

    /// Drops the conversation's creation lock once no other caller holds it.
    fn release_lock(&self, conversation_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = match self.creation_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // One reference in the map, one here.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(conversation_id);
        }
    }

    #[cfg(test)]
    fn creation_lock_count(&self) -> usize {
        self.creation_locks.lock().map(|l| l.len()).unwrap_or_default()
    }

    /// Returns the conversation's topic, creating one if it has none or its
    /// topic no longer exists.
    ///
    /// Calls for the same conversation are serialized, so concurrent callers
    /// share a single created topic.
    pub async fn get_or_create_topic(
        &self,
        conversation_id: &str,
        display_name: &str,
        phone_number: Option<&str>,
    ) -> Result<i64, BridgeError> {
        let lock = self.lock_for(conversation_id);
        let result = {
            let _guard = lock.lock().await;
            self.get_or_create_locked(conversation_id, display_name, phone_number)
                .await
        };
        self.release_lock(conversation_id, lock);
        result
    }

    async fn get_or_create_locked(
        &self,
        conversation_id: &str,
        display_name: &str,
        phone_number: Option<&str>,
    ) -> Result<i64, BridgeError> {
        if let Some(mapping) = self.state.chat(conversation_id).await {
            let topic_id = mapping.secondary_topic_id;
            if self.is_verified(conversation_id, topic_id).await {
                return Ok(topic_id);
            }
            warn!(conversation = %conversation_id, topic_id, "mapped topic is gone; recreating");
            self.cache.invalidate(conversation_id).await;
            if let Err(e) = self.state.remove_chat(conversation_id).await {
                debug!(error = %e, "continuing with stale mapping removed in memory only");
            }
        }

        self.create_topic(conversation_id, display_name, phone_number)
            .await
    }

    async fn create_topic(
        &self,
        conversation_id: &str,
        display_name: &str,
        phone_number: Option<&str>,
    ) -> Result<i64, BridgeError> {
        let title = topic_title(conversation_id, display_name);
        let topic_id = self.secondary.create_topic(self.chat_id, &title).await?;
        recording::record_topic_created();
        info!(conversation = %conversation_id, topic_id, title = %title, "forum topic created");

        let now = self.clock.now();
        let mapping = ChatMapping {
            primary_conversation_id: conversation_id.to_string(),
            secondary_topic_id: topic_id,
            display_name: display_name.to_string(),
            phone_number: phone_number.map(str::to_string),
            created_at: now,
            last_activity: now,
        };
        if let Err(e) = self.state.put_chat(mapping).await {
            debug!(error = %e, "continuing with in-memory chat mapping");
        }
        self.cache.insert(conversation_id, topic_id, true).await;

        if self.send_welcome {
            let text = welcome_text(conversation_id, display_name, phone_number);
            let target = SecondaryTarget {
                chat_id: self.chat_id,
                thread_id: Some(topic_id),
                reply_to: None,
            };
            if let Err(e) = self.secondary.send_text(target, &text).await {
                warn!(conversation = %conversation_id, topic_id, error = %e, "welcome message failed");
            }
        }
        Ok(topic_id)
    }

    async fn is_verified(&self, conversation_id: &str, topic_id: i64) -> bool {
        self.cache
            .is_verified(conversation_id, topic_id, || self.verify_topic_exists(topic_id))
            .await
    }

    /// Probes a topic. Only a "topic missing" error counts as absent; any other
    /// failure is assumed transient and the topic is treated as present.
    pub async fn verify_topic_exists(&self, topic_id: i64) -> bool {
        match self.secondary.probe_topic(self.chat_id, topic_id).await {
            Ok(()) => true,
            Err(e) if e.is_missing_topic() => {
                debug!(topic_id, error = %e, "topic probe reports missing topic");
                false
            }
            Err(e) => {
                debug!(topic_id, error = %e, "topic probe failed; assuming topic exists");
                true
            }
        }
    }

    /// Verifies every mapped topic and recreates the missing ones, keeping
    /// each conversation pointed at its new topic. Healthy topics cause no
    /// store writes.
    pub async fn recreate_missing_topics(&self) -> RecreateReport {
        let mut report = RecreateReport::default();
        for mapping in self.state.chats().await {
            report.checked += 1;
            let conversation = mapping.primary_conversation_id.clone();
            let old_topic = mapping.secondary_topic_id;

            let exists = self.verify_topic_exists(old_topic).await;
            self.cache.insert(&conversation, old_topic, exists).await;
            if exists {
                continue;
            }

            match self
                .get_or_create_topic(
                    &conversation,
                    &mapping.display_name,
                    mapping.phone_number.as_deref(),
                )
                .await
            {
                Ok(new_topic) => {
                    info!(conversation = %conversation, old_topic, new_topic, "topic recreated");
                    report.recreated.push((conversation, old_topic, new_topic));
                }
                Err(e) => {
                    warn!(conversation = %conversation, old_topic, error = %e, "topic recreation failed");
                    report.failed.push(conversation);
                }
            }
        }
        info!(
            checked = report.checked,
            recreated = report.recreated.len(),
            failed = report.failed.len(),
            "topic reconciliation finished"
        );
        report
    }

    /// Recreates the topic of a conversation whose topic was reported missing.
    pub async fn recreate_topic(&self, conversation_id: &str) -> Result<i64, BridgeError> {
        let Some(mapping) = self.state.chat(conversation_id).await else {
            return Err(BridgeError::NotFound {
                kind: "chat".into(),
                key: conversation_id.to_string(),
            });
        };
        self.cache
            .insert(conversation_id, mapping.secondary_topic_id, false)
            .await;
        self.get_or_create_topic(
            conversation_id,
            &mapping.display_name,
            mapping.phone_number.as_deref(),
        )
        .await
    }

    /// Reverse lookup used to route forum messages back to their conversation.
    pub async fn conversation_for_topic(&self, topic_id: i64) -> Option<String> {
        self.state.conversation_for_topic(topic_id).await
    }

    pub async fn prune_cache(&self) -> usize {
        self.cache.prune().await
    }
}

/// Title for a conversation's topic; status topics are prefixed.
pub fn topic_title(conversation_id: &str, display_name: &str) -> String {
    let title = if conversation_id.starts_with(STATUS_KEY_PREFIX) {
        format!("Status: {display_name}")
    } else {
        display_name.to_string()
    };
    title.chars().take(MAX_TOPIC_TITLE_CHARS).collect()
}

fn welcome_text(conversation_id: &str, display_name: &str, phone_number: Option<&str>) -> String {
    let heading = if conversation_id.starts_with(STATUS_KEY_PREFIX) {
        format!("Status updates from {display_name}")
    } else {
        format!("Conversation with {display_name}")
    };
    format!(
        "{heading}\nPhone: {}\nID: {conversation_id}",
        phone_number.unwrap_or("unknown")
    )
}
