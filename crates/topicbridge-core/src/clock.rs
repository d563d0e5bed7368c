// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time source used by caches, batching windows, and retry backoff.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of wall-clock time and delays.
///
/// Production code uses [`SystemClock`]; tests inject a fake that advances
/// instantly and records every requested delay.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Current monotonic time. Deadlines compare against this, never `now`,
    /// so wall-clock adjustments cannot stretch a wait.
    fn instant(&self) -> Instant;

    /// Suspends the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by `chrono::Utc` and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
