// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic clock for backoff and TTL tests.
//!
//! `FakeClock::sleep` records the requested duration and advances the clock
//! instantly, so retry schedules can be asserted without real waiting.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Instant;

use topicbridge_core::Clock;

/// A manually driven clock.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    /// A clock starting at 2026-01-01T00:00:00Z.
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }

    /// A clock starting at `start`.
    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Moves the clock forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        *self.now.lock().unwrap() += delta;
        *self.elapsed.lock().unwrap() += by;
    }

    /// Moves wall-clock time by `delta` (possibly backwards) without
    /// touching the monotonic reading, like an NTP correction.
    pub fn shift_wall_clock(&self, delta: chrono::Duration) {
        *self.now.lock().unwrap() += delta;
    }

    /// Every duration passed to [`Clock::sleep`], in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Sleeps that were not zero-length.
    pub fn non_zero_sleeps(&self) -> Vec<Duration> {
        self.sleeps()
            .into_iter()
            .filter(|d| !d.is_zero())
            .collect()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn instant(&self) -> Instant {
        self.origin + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
