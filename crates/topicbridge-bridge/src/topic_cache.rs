// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Short-TTL cache of topic verification results.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::trace;

use topicbridge_core::Clock;

#[derive(Debug, Clone, Copy)]
struct Entry {
    verified: bool,
    checked_at: DateTime<Utc>,
}

/// Caches whether a conversation's topic still exists.
///
/// Both positive and negative results are cached. Entries older than the TTL
/// count as misses.
pub struct TopicCache {
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<(String, i64), Entry>>,
}

impl TopicCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::MAX),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached result, or runs `verify` on a miss and caches its answer.
    pub async fn is_verified<F, Fut>(&self, conversation_id: &str, topic_id: i64, verify: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        if let Some(verified) = self.get(conversation_id, topic_id).await {
            trace!(conversation = %conversation_id, topic_id, verified, "topic cache hit");
            return verified;
        }
        let verified = verify().await;
        self.insert(conversation_id, topic_id, verified).await;
        verified
    }

    /// The unexpired cached result, if any.
    pub async fn get(&self, conversation_id: &str, topic_id: i64) -> Option<bool> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries
            .get(&(conversation_id.to_string(), topic_id))
            .filter(|e| now - e.checked_at < self.ttl)
            .map(|e| e.verified)
    }

    pub async fn insert(&self, conversation_id: &str, topic_id: i64, verified: bool) {
        let entry = Entry {
            verified,
            checked_at: self.clock.now(),
        };
        self.entries
            .lock()
            .await
            .insert((conversation_id.to_string(), topic_id), entry);
    }

    /// Drops every entry for a conversation.
    pub async fn invalidate(&self, conversation_id: &str) {
        self.entries
            .lock()
            .await
            .retain(|(conversation, _), _| conversation != conversation_id);
    }

    /// Drops expired entries.
    pub async fn prune(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| now - e.checked_at < self.ttl);
        before - entries.len()
    }
}
