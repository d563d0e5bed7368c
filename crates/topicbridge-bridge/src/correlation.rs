// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bidirectional index between primary message ids and forum message triples.
//!
//! Pairs are keyed by primary message id, with a composite
//! `(chat, thread, message)` index for O(1) resolution from the forum side.
//! Every change is written through to the mapping store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use topicbridge_core::traits::upsert_document;
use topicbridge_core::types::{MappingKind, MessagePair, PrimaryRef, SecondaryRef};
use topicbridge_core::{BridgeError, MappingStore};

#[derive(Default)]
struct Pairs {
    by_primary: HashMap<String, MessagePair>,
    by_secondary: HashMap<SecondaryRef, String>,
}

fn secondary_ref(pair: &MessagePair) -> SecondaryRef {
    SecondaryRef {
        chat_id: pair.secondary_chat_id,
        thread_id: pair.secondary_thread_id,
        message_id: pair.secondary_message_id,
    }
}

fn primary_ref(pair: &MessagePair) -> PrimaryRef {
    PrimaryRef {
        message_id: pair.primary_message_id.clone(),
        conversation_id: pair.conversation_id.clone(),
        participant_id: pair.participant_id.clone(),
    }
}

impl Pairs {
    fn insert(&mut self, pair: MessagePair) {
        let key = secondary_ref(&pair);
        if let Some(old) = self
            .by_primary
            .insert(pair.primary_message_id.clone(), pair.clone())
        {
            self.by_secondary.remove(&secondary_ref(&old));
        }
        self.by_secondary.insert(key, pair.primary_message_id);
    }

    fn remove(&mut self, primary_message_id: &str) -> Option<MessagePair> {
        let pair = self.by_primary.remove(primary_message_id)?;
        self.by_secondary.remove(&secondary_ref(&pair));
        Some(pair)
    }
}

/// Message correlation index.
pub struct CorrelationIndex {
    store: Arc<dyn MappingStore>,
    pairs: Mutex<Pairs>,
}

impl CorrelationIndex {
    /// Builds the index from pairs loaded at startup.
    pub fn new(store: Arc<dyn MappingStore>, loaded: Vec<MessagePair>) -> Self {
        let mut pairs = Pairs::default();
        for pair in loaded {
            pairs.insert(pair);
        }
        Self {
            store,
            pairs: Mutex::new(pairs),
        }
    }

    /// Records the two sides of one relayed message.
    ///
    /// A second pair with the same primary id replaces the first. Pairs start
    /// unread when `mark_read` is false; outbound relays pass `true` since there
    /// is nothing to acknowledge.
    pub async fn record_pair(
        &self,
        primary: PrimaryRef,
        secondary: SecondaryRef,
        timestamp: DateTime<Utc>,
        mark_read: bool,
    ) -> Result<(), BridgeError> {
        let pair = MessagePair {
            primary_message_id: primary.message_id,
            secondary_chat_id: secondary.chat_id,
            secondary_thread_id: secondary.thread_id,
            secondary_message_id: secondary.message_id,
            participant_id: primary.participant_id,
            conversation_id: primary.conversation_id,
            timestamp,
            mark_read,
        };
        debug!(
            primary_id = %pair.primary_message_id,
            thread_id = pair.secondary_thread_id,
            message_id = pair.secondary_message_id,
            "recording message pair"
        );
        self.pairs.lock().await.insert(pair.clone());
        self.persist(&pair).await
    }

    /// Resolves a forum message to the primary message it mirrors.
    pub async fn resolve_from_secondary(&self, secondary: SecondaryRef) -> Option<PrimaryRef> {
        let pairs = self.pairs.lock().await;
        let id = pairs.by_secondary.get(&secondary)?;
        pairs.by_primary.get(id).map(primary_ref)
    }

    /// Resolves a primary message to its forum counterpart within one conversation.
    pub async fn resolve_from_primary(
        &self,
        primary_message_id: &str,
        conversation_id: &str,
    ) -> Option<SecondaryRef> {
        self.pairs
            .lock()
            .await
            .by_primary
            .get(primary_message_id)
            .filter(|p| p.conversation_id == conversation_id)
            .map(secondary_ref)
    }

    /// Unacknowledged pairs of one conversation, oldest first.
    pub async fn unread_for(&self, conversation_id: &str) -> Vec<MessagePair> {
        let mut unread: Vec<_> = self
            .pairs
            .lock()
            .await
            .by_primary
            .values()
            .filter(|p| p.conversation_id == conversation_id && !p.mark_read)
            .cloned()
            .collect();
        unread.sort_by_key(|p| p.timestamp);
        unread
    }

    /// Marks the given messages read, but only those belonging to `conversation_id`.
    ///
    /// Returns the pairs that transitioned from unread to read.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        primary_message_ids: &[String],
    ) -> Vec<MessagePair> {
        let changed: Vec<MessagePair> = {
            let mut pairs = self.pairs.lock().await;
            primary_message_ids
                .iter()
                .filter_map(|id| {
                    let pair = pairs.by_primary.get_mut(id)?;
                    if pair.conversation_id != conversation_id || pair.mark_read {
                        return None;
                    }
                    pair.mark_read = true;
                    Some(pair.clone())
                })
                .collect()
        };
        for pair in &changed {
            self.persist(pair).await.ok();
        }
        changed
    }

    /// Removes pairs recorded before `cutoff`. Returns how many were purged.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let expired: Vec<MessagePair> = {
            let mut pairs = self.pairs.lock().await;
            let ids: Vec<String> = pairs
                .by_primary
                .values()
                .filter(|p| p.timestamp < cutoff)
                .map(|p| p.primary_message_id.clone())
                .collect();
            ids.iter().filter_map(|id| pairs.remove(id)).collect()
        };
        for pair in &expired {
            if let Err(e) = self
                .store
                .delete(MappingKind::MessagePair, &pair.primary_message_id)
                .await
            {
                warn!(
                    primary_id = %pair.primary_message_id,
                    error = %e,
                    "failed to delete expired message pair"
                );
            }
        }
        expired.len()
    }

    /// Every pair currently indexed.
    pub async fn pairs(&self) -> Vec<MessagePair> {
        self.pairs.lock().await.by_primary.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.pairs.lock().await.by_primary.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, pair: &MessagePair) -> Result<(), BridgeError> {
        upsert_document(self.store.as_ref(), pair)
            .await
            .inspect_err(|e| {
                warn!(
                    primary_id = %pair.primary_message_id,
                    error = %e,
                    "message pair write failed; in-memory state kept"
                )
            })
    }
}
