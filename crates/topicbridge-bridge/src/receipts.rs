// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation batching of read acknowledgements.
//!
//! The first key for a conversation opens a window; every key that arrives
//! before it closes joins the same batch, which is then flushed as a single
//! queue item.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use topicbridge_core::types::ReadKey;

struct Batch {
    opened_at: DateTime<Utc>,
    keys: Vec<ReadKey>,
}

/// A flushed batch of read keys for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptBatch {
    pub conversation_id: String,
    pub keys: Vec<ReadKey>,
}

pub struct ReadReceiptBatcher {
    window: chrono::Duration,
    batches: Mutex<HashMap<String, Batch>>,
}

impl ReadReceiptBatcher {
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero()),
            batches: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a key to its conversation's open batch. Duplicate keys are ignored.
    pub async fn add(&self, key: ReadKey, now: DateTime<Utc>) {
        let mut batches = self.batches.lock().await;
        let batch = batches
            .entry(key.conversation_id.clone())
            .or_insert_with(|| Batch {
                opened_at: now,
                keys: Vec::new(),
            });
        if !batch.keys.contains(&key) {
            batch.keys.push(key);
        }
    }

    /// Removes and returns every batch whose window has elapsed.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<ReceiptBatch> {
        let mut batches = self.batches.lock().await;
        let due: Vec<String> = batches
            .iter()
            .filter(|(_, b)| now - b.opened_at >= self.window)
            .map(|(c, _)| c.clone())
            .collect();
        let mut flushed: Vec<ReceiptBatch> = due
            .into_iter()
            .filter_map(|c| {
                batches.remove(&c).map(|b| ReceiptBatch {
                    conversation_id: c,
                    keys: b.keys,
                })
            })
            .collect();
        flushed.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        flushed
    }

    /// Removes and returns every batch regardless of age.
    pub async fn take_all(&self) -> Vec<ReceiptBatch> {
        let mut flushed: Vec<ReceiptBatch> = self
            .batches
            .lock()
            .await
            .drain()
            .map(|(conversation_id, b)| ReceiptBatch {
                conversation_id,
                keys: b.keys,
            })
            .collect();
        flushed.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        flushed
    }

    pub async fn pending_conversations(&self) -> usize {
        self.batches.lock().await.len()
    }
}
