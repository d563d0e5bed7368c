// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Priority delivery queue with bounded exponential-backoff retry.
//!
//! Each item moves `Queued -> Processing -> {Done | Requeued | DeadLettered}`.
//! Perishable items (presence) are `Discarded` on failure instead of retried.
//! One drain loop runs at a time; items enqueued while it runs are picked up
//! by the same loop.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use topicbridge_config::model::QueueConfig;
use topicbridge_core::types::{PresenceState, PrimaryMessage, ReadKey, SecondaryMessage};
use topicbridge_core::{BridgeError, Clock};

use crate::recording;

/// Priority of relay items. Higher runs first.
pub const PRIORITY_RELAY: u8 = 5;
/// Priority of read-receipt batches.
pub const PRIORITY_RECEIPT: u8 = 1;

/// Kind of relay work an item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Primary message relayed into its forum topic.
    ForwardIn,
    /// Forum reply relayed out to the primary conversation.
    ForwardOut,
    ReadReceipt,
    Presence,
}

/// Work carried by a queue item.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    ForwardIn {
        message: PrimaryMessage,
    },
    ForwardOut {
        message: SecondaryMessage,
        conversation_id: String,
    },
    ReadReceipt {
        conversation_id: String,
        keys: Vec<ReadKey>,
    },
    Presence {
        conversation_id: String,
        state: PresenceState,
    },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::ForwardIn { .. } => JobKind::ForwardIn,
            Self::ForwardOut { .. } => JobKind::ForwardOut,
            Self::ReadReceipt { .. } => JobKind::ReadReceipt,
            Self::Presence { .. } => JobKind::Presence,
        }
    }

    pub fn default_priority(&self) -> u8 {
        match self {
            Self::ReadReceipt { .. } => PRIORITY_RECEIPT,
            _ => PRIORITY_RELAY,
        }
    }

    /// Perishable work is dropped on failure rather than retried.
    pub fn is_perishable(&self) -> bool {
        matches!(self, Self::Presence { .. })
    }

    /// Conversation the item relates to, for log context.
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::ForwardIn { message, .. } => &message.conversation_id,
            Self::ForwardOut {
                conversation_id, ..
            }
            | Self::ReadReceipt {
                conversation_id, ..
            }
            | Self::Presence {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// One unit of relay work. Lives only in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub id: u64,
    pub payload: JobPayload,
    pub priority: u8,
    pub enqueued_at: DateTime<Utc>,
    pub retries: u32,
}

/// Observable state of an item id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ItemState {
    Queued,
    Processing,
    Requeued,
    DeadLettered,
}

/// An item that exhausted its retries.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub item: QueueItem,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Counts from one drain run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub delivered: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
    pub discarded: usize,
}

impl DrainSummary {
    pub fn processed(&self) -> usize {
        self.delivered + self.requeued + self.dead_lettered + self.discarded
    }
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub dead_letters: usize,
    pub draining: bool,
}

/// Executes one queue item.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, item: &QueueItem) -> Result<(), BridgeError>;
}

/// Retry deadlines further out than this are clamped to it.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Delay before the `retries`-th retry: `base * 2^(retries - 1)`.
pub fn backoff_delay(base: Duration, retries: u32) -> Duration {
    let exponent = retries.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

#[derive(Debug)]
struct Pending {
    item: QueueItem,
    seq: u64,
    not_before: Instant,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<Pending>,
    processing: HashSet<u64>,
    draining: bool,
    dead_letters: BTreeMap<u64, DeadLetter>,
    next_id: u64,
    next_seq: u64,
}

enum Next {
    Ready(QueueItem),
    Wait(Instant),
    Idle,
}

impl QueueState {
    /// Picks the best ready item and moves it into the processing set.
    ///
    /// When nothing is left, clears the draining flag under the same guard so
    /// a concurrent enqueue either lands before the check or sees the loop gone.
    fn next(&mut self, now: Instant) -> Next {
        let best = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.not_before <= now && !self.processing.contains(&p.item.id))
            .max_by_key(|(_, p)| (p.item.priority, Reverse(p.seq)))
            .map(|(idx, _)| idx);

        if let Some(idx) = best {
            let pending = self.pending.swap_remove(idx);
            self.processing.insert(pending.item.id);
            return Next::Ready(pending.item);
        }

        match self.pending.iter().map(|p| p.not_before).min() {
            Some(at) => Next::Wait(at),
            None => {
                self.draining = false;
                Next::Idle
            }
        }
    }

    fn push(&mut self, item: QueueItem, not_before: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Pending {
            item,
            seq,
            not_before,
        });
    }
}

/// The delivery queue and retry engine.
pub struct DeliveryQueue {
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
    work: Notify,
    shutdown: CancellationToken,
}

impl DeliveryQueue {
    pub fn new(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(QueueState::default()),
            work: Notify::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Enqueues work at its default priority. Returns the item id.
    pub async fn enqueue(&self, payload: JobPayload) -> u64 {
        let priority = payload.default_priority();
        self.enqueue_with_priority(payload, priority).await
    }

    pub async fn enqueue_with_priority(&self, payload: JobPayload, priority: u8) -> u64 {
        let now = self.clock.now();
        let ready = self.clock.instant();
        let kind = payload.kind();
        let id = {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = state.next_id;
            state.push(
                QueueItem {
                    id,
                    payload,
                    priority,
                    enqueued_at: now,
                    retries: 0,
                },
                ready,
            );
            id
        };
        debug!(item_id = id, %kind, priority, "relay item queued");
        recording::record_enqueued(kind);
        self.work.notify_one();
        id
    }

    /// Resolves when work has been enqueued since the last wakeup.
    pub async fn notified(&self) {
        self.work.notified().await;
    }

    /// Stops drain loops after their current item.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.work.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Processes items until the queue is empty, waiting out backoff delays.
    ///
    /// A backoff wait ends early when new work is enqueued, so a retrying
    /// item never holds back fresh items that are ready now.
    ///
    /// Returns immediately with an empty summary when another drain is running.
    pub async fn drain(&self, handler: &dyn JobHandler) -> DrainSummary {
        {
            let mut state = self.state.lock().await;
            if state.draining {
                debug!("drain already in progress");
                return DrainSummary::default();
            }
            state.draining = true;
        }

        let mut summary = DrainSummary::default();
        loop {
            if self.shutdown.is_cancelled() {
                self.state.lock().await.draining = false;
                break;
            }

            let now = self.clock.instant();
            let next = self.state.lock().await.next(now);
            match next {
                Next::Ready(item) => {
                    self.process(item, handler, &mut summary).await;
                    if self.has_pending().await {
                        self.pause(self.config.inter_item_delay()).await;
                    }
                }
                Next::Wait(until) => {
                    let wait = until.saturating_duration_since(now);
                    tokio::select! {
                        _ = self.pause(wait) => {}
                        _ = self.work.notified() => {
                            debug!("new work arrived during backoff wait");
                        }
                    }
                }
                Next::Idle => break,
            }
        }

        if summary.processed() > 0 {
            debug!(
                delivered = summary.delivered,
                requeued = summary.requeued,
                dead_lettered = summary.dead_lettered,
                discarded = summary.discarded,
                "drain finished"
            );
        }
        summary
    }

    async fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.clock.sleep(duration) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    async fn has_pending(&self) -> bool {
        !self.state.lock().await.pending.is_empty()
    }

    async fn process(&self, mut item: QueueItem, handler: &dyn JobHandler, summary: &mut DrainSummary) {
        let kind = item.payload.kind();
        let result = handler.handle(&item).await;
        let now = self.clock.now();
        let ready = self.clock.instant();

        let mut state = self.state.lock().await;
        state.processing.remove(&item.id);

        match result {
            Ok(()) => {
                summary.delivered += 1;
                info!(
                    item_id = item.id,
                    %kind,
                    conversation = %item.payload.conversation_id(),
                    retries = item.retries,
                    "relay item delivered"
                );
                recording::record_outcome(kind, "delivered");
            }
            Err(e) if item.payload.is_perishable() => {
                summary.discarded += 1;
                debug!(item_id = item.id, %kind, error = %e, "perishable relay item discarded");
                recording::record_outcome(kind, "discarded");
            }
            Err(e) => {
                item.retries += 1;
                if item.retries < self.config.max_retries {
                    let delay = backoff_delay(self.config.base_delay(), item.retries);
                    summary.requeued += 1;
                    warn!(
                        item_id = item.id,
                        %kind,
                        conversation = %item.payload.conversation_id(),
                        retries = item.retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "relay item failed; requeued"
                    );
                    recording::record_outcome(kind, "requeued");
                    state.push(item, ready + delay.min(MAX_RETRY_DELAY));
                } else {
                    summary.dead_lettered += 1;
                    error!(
                        item_id = item.id,
                        %kind,
                        conversation = %item.payload.conversation_id(),
                        retries = item.retries,
                        error = %e,
                        "relay item dead-lettered"
                    );
                    recording::record_outcome(kind, "dead_lettered");
                    while state.dead_letters.len() >= self.config.dead_letter_capacity {
                        if state.dead_letters.pop_first().is_none() {
                            break;
                        }
                    }
                    state.dead_letters.insert(
                        item.id,
                        DeadLetter {
                            item,
                            error: e.to_string(),
                            failed_at: now,
                        },
                    );
                }
            }
        }
    }

    /// Where an item currently is; `None` once it is done, discarded, or unknown.
    pub async fn item_state(&self, id: u64) -> Option<ItemState> {
        let state = self.state.lock().await;
        if state.processing.contains(&id) {
            return Some(ItemState::Processing);
        }
        if let Some(p) = state.pending.iter().find(|p| p.item.id == id) {
            return Some(if p.item.retries > 0 {
                ItemState::Requeued
            } else {
                ItemState::Queued
            });
        }
        state
            .dead_letters
            .contains_key(&id)
            .then_some(ItemState::DeadLettered)
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            pending: state.pending.len(),
            processing: state.processing.len(),
            dead_letters: state.dead_letters.len(),
            draining: state.draining,
        }
    }

    /// Dead-lettered items, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state
            .lock()
            .await
            .dead_letters
            .values()
            .cloned()
            .collect()
    }

    /// Drops dead letters that failed before `cutoff`.
    pub async fn purge_dead_letters(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        let before = state.dead_letters.len();
        state.dead_letters.retain(|_, d| d.failed_at >= cutoff);
        before - state.dead_letters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use topicbridge_core::types::Network;
    use topicbridge_test_utils::FakeClock;
    use tracing_test::traced_test;

    /// Fails each conversation a scripted number of times, then succeeds.
    #[derive(Default)]
    struct ScriptedHandler {
        failures: StdMutex<HashMap<String, u32>>,
        handled: StdMutex<Vec<(u64, String)>>,
    }

    impl ScriptedHandler {
        fn failing(conversation: &str, times: u32) -> Self {
            let handler = Self::default();
            handler
                .failures
                .lock()
                .unwrap()
                .insert(conversation.to_string(), times);
            handler
        }

        fn order(&self) -> Vec<String> {
            self.handled
                .lock()
                .unwrap()
                .iter()
                .map(|(_, c)| c.clone())
                .collect()
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn handle(&self, item: &QueueItem) -> Result<(), BridgeError> {
            let conversation = item.payload.conversation_id().to_string();
            self.handled
                .lock()
                .unwrap()
                .push((item.id, conversation.clone()));
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&conversation) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    Err(BridgeError::transport(Network::Secondary, "rate limited"))
                }
                _ => Ok(()),
            }
        }
    }

    fn config(inter_item_delay_ms: u64) -> QueueConfig {
        QueueConfig {
            max_retries: 3,
            base_delay_ms: 1000,
            inter_item_delay_ms,
            dead_letter_capacity: 2,
        }
    }

    fn receipt(conversation: &str) -> JobPayload {
        JobPayload::ReadReceipt {
            conversation_id: conversation.to_string(),
            keys: Vec::new(),
        }
    }

    fn presence(conversation: &str) -> JobPayload {
        JobPayload::Presence {
            conversation_id: conversation.to_string(),
            state: PresenceState::Composing,
        }
    }

    fn queue(clock: &Arc<FakeClock>, inter_item_delay_ms: u64) -> DeliveryQueue {
        DeliveryQueue::new(
            config(inter_item_delay_ms),
            Arc::clone(clock) as Arc<dyn Clock>,
        )
    }

    #[test]
    fn backoff_doubles_from_base() {
        let base = Duration::from_millis(1000);
        let delays: Vec<_> = (1..=4).map(|n| backoff_delay(base, n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let delay = backoff_delay(Duration::from_secs(u64::MAX / 2), 40);
        assert_eq!(delay, Duration::MAX);
    }

    #[tokio::test]
    #[traced_test]
    async fn item_failing_below_budget_ends_done() {
        let clock = Arc::new(FakeClock::new());
        let queue = queue(&clock, 0);
        let handler = ScriptedHandler::failing("a", 2);

        let id = queue.enqueue(receipt("a")).await;
        let summary = queue.drain(&handler).await;

        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.requeued, 2);
        assert_eq!(summary.dead_lettered, 0);
        assert_eq!(queue.item_state(id).await, None);
        assert!(queue.dead_letters().await.is_empty());
        assert_eq!(
            clock.non_zero_sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|l| l.contains("relay item delivered"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one success log, got {n}")),
            }
        });
    }

    #[tokio::test]
    async fn item_failing_max_retries_is_dead_lettered() {
        let clock = Arc::new(FakeClock::new());
        let queue = queue(&clock, 0);
        let handler = ScriptedHandler::failing("a", 3);

        let id = queue.enqueue(receipt("a")).await;
        let summary = queue.drain(&handler).await;

        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.dead_lettered, 1);
        assert_eq!(queue.item_state(id).await, Some(ItemState::DeadLettered));
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].item.retries, 3);
        assert!(dead[0].error.contains("rate limited"));
        // Only two waits: the third failure is terminal.
        assert_eq!(clock.non_zero_sleeps().len(), 2);
    }

    #[tokio::test]
    async fn higher_priority_runs_first_and_bands_are_fifo() {
        let clock = Arc::new(FakeClock::new());
        let queue = queue(&clock, 0);
        let handler = ScriptedHandler::default();

        queue.enqueue(receipt("low-1")).await;
        queue
            .enqueue_with_priority(receipt("high-1"), PRIORITY_RELAY)
            .await;
        queue.enqueue(receipt("low-2")).await;
        queue
            .enqueue_with_priority(receipt("high-2"), PRIORITY_RELAY)
            .await;

        queue.drain(&handler).await;
        assert_eq!(handler.order(), vec!["high-1", "high-2", "low-1", "low-2"]);
    }

    #[tokio::test]
    async fn requeued_item_waits_while_others_proceed() {
        let clock = Arc::new(FakeClock::new());
        let queue = queue(&clock, 0);
        let handler = ScriptedHandler::failing("a", 1);

        queue.enqueue(receipt("a")).await;
        queue.enqueue(receipt("b")).await;
        queue.drain(&handler).await;

        assert_eq!(handler.order(), vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn failed_presence_is_discarded_without_retry() {
        let clock = Arc::new(FakeClock::new());
        let queue = queue(&clock, 0);
        let handler = ScriptedHandler::failing("a", 5);

        let id = queue.enqueue(presence("a")).await;
        let summary = queue.drain(&handler).await;

        assert_eq!(summary.discarded, 1);
        assert_eq!(handler.order().len(), 1);
        assert_eq!(queue.item_state(id).await, None);
        assert!(queue.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn inter_item_delay_separates_items() {
        let clock = Arc::new(FakeClock::new());
        let queue = queue(&clock, 100);
        let handler = ScriptedHandler::default();

        queue.enqueue(receipt("a")).await;
        queue.enqueue(receipt("b")).await;
        queue.enqueue(receipt("c")).await;
        queue.drain(&handler).await;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(100)]
        );
    }

    #[tokio::test]
    async fn concurrent_drain_returns_immediately() {
        struct Reentrant<'a> {
            queue: &'a DeliveryQueue,
            inner: ScriptedHandler,
            nested: StdMutex<Option<DrainSummary>>,
        }

        #[async_trait]
        impl JobHandler for Reentrant<'_> {
            async fn handle(&self, item: &QueueItem) -> Result<(), BridgeError> {
                if item.id == 1 {
                    // Enqueue while draining, then try to start a second loop.
                    self.queue.enqueue(receipt("late")).await;
                    let nested = self.queue.drain(&self.inner).await;
                    *self.nested.lock().unwrap() = Some(nested);
                }
                self.inner.handle(item).await
            }
        }

        let clock = Arc::new(FakeClock::new());
        let queue = queue(&clock, 0);
        let handler = Reentrant {
            queue: &queue,
            inner: ScriptedHandler::default(),
            nested: StdMutex::new(None),
        };

        queue.enqueue(receipt("first")).await;
        let summary = queue.drain(&handler).await;

        assert_eq!(*handler.nested.lock().unwrap(), Some(DrainSummary::default()));
        assert_eq!(summary.delivered, 2);
        assert_eq!(handler.inner.order(), vec!["first", "late"]);
        assert!(!queue.stats().await.draining);
    }

    #[tokio::test]
    async fn dead_letters_are_bounded_and_purgeable() {
        let clock = Arc::new(FakeClock::new());
        let queue = DeliveryQueue::new(
            QueueConfig {
                max_retries: 1,
                ..config(0)
            },
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        let handler = ScriptedHandler::default();
        for conversation in ["a", "b", "c"] {
            handler
                .failures
                .lock()
                .unwrap()
                .insert(conversation.to_string(), 1);
            queue.enqueue(receipt(conversation)).await;
        }

        queue.drain(&handler).await;
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 2);
        assert_eq!(dead[0].item.payload.conversation_id(), "b");

        clock.advance(Duration::from_secs(60));
        assert_eq!(queue.purge_dead_letters(clock.now()).await, 2);
        assert_eq!(queue.stats().await.dead_letters, 0);
    }

    /// Records when each conversation was handled, in paused tokio time.
    struct TimedHandler {
        start: tokio::time::Instant,
        inner: ScriptedHandler,
        log: StdMutex<Vec<(String, u64)>>,
    }

    #[async_trait]
    impl JobHandler for TimedHandler {
        async fn handle(&self, item: &QueueItem) -> Result<(), BridgeError> {
            let elapsed = self.start.elapsed().as_millis() as u64;
            self.log
                .lock()
                .unwrap()
                .push((item.payload.conversation_id().to_string(), elapsed));
            self.inner.handle(item).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_items_do_not_wait_out_another_items_backoff() {
        let queue = Arc::new(DeliveryQueue::new(
            QueueConfig {
                base_delay_ms: 30_000,
                ..config(0)
            },
            Arc::new(topicbridge_core::SystemClock) as Arc<dyn Clock>,
        ));
        let handler = Arc::new(TimedHandler {
            start: tokio::time::Instant::now(),
            inner: ScriptedHandler::failing("a", 1),
            log: StdMutex::new(Vec::new()),
        });

        queue.enqueue(receipt("a")).await;
        let draining = {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { queue.drain(handler.as_ref()).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        queue.enqueue(receipt("b")).await;

        let summary = draining.await.unwrap();
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.requeued, 1);
        let log = handler.log.lock().unwrap().clone();
        let order: Vec<_> = log.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "a"]);
        // "b" runs as soon as it arrives, long before "a" is due again.
        assert!(log[1].1 < 2_000, "fresh item handled at {}ms", log[1].1);
        assert!(log[2].1 >= 30_000);
    }

    /// Moves the wall clock back a year while handling conversation "b".
    struct WallClockJump {
        clock: Arc<FakeClock>,
        inner: ScriptedHandler,
    }

    #[async_trait]
    impl JobHandler for WallClockJump {
        async fn handle(&self, item: &QueueItem) -> Result<(), BridgeError> {
            if item.payload.conversation_id() == "b" {
                self.clock.shift_wall_clock(-chrono::Duration::days(365));
            }
            self.inner.handle(item).await
        }
    }

    #[tokio::test]
    async fn backward_wall_clock_jump_does_not_stretch_backoff() {
        let clock = Arc::new(FakeClock::new());
        let queue = queue(&clock, 0);
        let handler = WallClockJump {
            clock: Arc::clone(&clock),
            inner: ScriptedHandler::failing("a", 1),
        };

        queue.enqueue(receipt("a")).await;
        queue.enqueue(receipt("b")).await;
        let summary = queue.drain(&handler).await;

        assert_eq!(summary.delivered, 2);
        assert_eq!(handler.inner.order(), vec!["a", "b", "a"]);
        assert_eq!(clock.non_zero_sleeps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn closed_queue_stops_draining() {
        let clock = Arc::new(FakeClock::new());
        let queue = queue(&clock, 0);
        let handler = ScriptedHandler::default();
        queue.enqueue(receipt("a")).await;
        queue.close();

        let summary = queue.drain(&handler).await;
        assert_eq!(summary.processed(), 0);
        assert_eq!(queue.stats().await.pending, 1);
    }
}
