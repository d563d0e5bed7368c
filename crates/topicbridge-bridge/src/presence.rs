// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call-site throttle for presence updates.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Admits at most one presence update per identity per interval.
pub struct PresenceThrottle {
    min_interval: chrono::Duration,
    last_admitted: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl PresenceThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval: chrono::Duration::from_std(min_interval)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            last_admitted: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` and records the admission when `identity` is outside its interval.
    pub async fn admit(&self, identity: &str, now: DateTime<Utc>) -> bool {
        let mut last = self.last_admitted.lock().await;
        match last.get(identity) {
            Some(at) if now - *at < self.min_interval => false,
            _ => {
                last.insert(identity.to_string(), now);
                true
            }
        }
    }

    /// Forgets identities idle for longer than `older_than`.
    pub async fn prune(&self, now: DateTime<Utc>, older_than: chrono::Duration) {
        self.last_admitted
            .lock()
            .await
            .retain(|_, at| now - *at < older_than);
    }
}
