// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bridge engine: turns transport events into queued relay work and
//! executes that work against both networks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use topicbridge_config::model::BridgeConfig;
use topicbridge_core::types::{
    ConnectionState, MessageBody, MessagePair, OutboundContent, PresenceState, PrimaryEvent,
    PrimaryMessage, PrimaryRef, ReadKey, STATUS_BROADCAST_ID, STATUS_KEY_PREFIX, SecondaryEvent,
    SecondaryMessage, SecondaryRef, SecondaryTarget, phone_from_identity,
    status_conversation_key,
};
use topicbridge_core::{
    BridgeError, Clock, MappingStore, Network, PrimaryTransport, SecondaryTransport,
};

use crate::media::{DeliveredMessage, MediaRelay, RelayDestination, Transcoder};
use crate::presence::PresenceThrottle;
use crate::queue::{
    DeadLetter, DeliveryQueue, DrainSummary, JobHandler, JobPayload, QueueItem, QueueStats,
};
use crate::receipts::ReadReceiptBatcher;
use crate::recording;
use crate::state::BridgeState;
use crate::topic_cache::TopicCache;
use crate::topics::{RecreateReport, TopicManager};

/// Presence throttle entries idle for longer than this are pruned.
const PRESENCE_RETENTION_MINUTES: i64 = 10;

/// External collaborators the engine is wired to.
pub struct EngineDeps {
    pub primary: Arc<dyn PrimaryTransport>,
    pub secondary: Arc<dyn SecondaryTransport>,
    pub store: Arc<dyn MappingStore>,
    pub clock: Arc<dyn Clock>,
    /// Voice-note transcoder; `None` sends voice notes as plain audio.
    pub transcoder: Option<Arc<dyn Transcoder>>,
}

/// Counts from one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub pairs_purged: usize,
    pub dead_letters_purged: usize,
    pub cache_entries_pruned: usize,
}

struct EngineCore {
    config: BridgeConfig,
    chat_id: i64,
    primary: Arc<dyn PrimaryTransport>,
    secondary: Arc<dyn SecondaryTransport>,
    clock: Arc<dyn Clock>,
    state: Arc<BridgeState>,
    topics: TopicManager,
    media: MediaRelay,
    queue: DeliveryQueue,
    receipts: ReadReceiptBatcher,
    presence: PresenceThrottle,
    was_disconnected: AtomicBool,
}

/// The bridge engine.
///
/// Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct BridgeEngine {
    core: Arc<EngineCore>,
}

impl BridgeEngine {
    /// Rebuilds state from the store and wires the engine's components.
    ///
    /// Fails with a configuration error when no forum chat is configured.
    pub async fn new(config: BridgeConfig, deps: EngineDeps) -> Result<Self, BridgeError> {
        let chat_id = config
            .telegram
            .chat_id
            .ok_or_else(|| BridgeError::Config("telegram.chat_id is required".into()))?;

        recording::register_metrics();
        let state = Arc::new(BridgeState::load(deps.store).await?);
        recording::set_message_pairs(state.correlation().len().await);

        let cache = TopicCache::new(config.cache.topic_ttl(), Arc::clone(&deps.clock));
        let topics = TopicManager::new(
            Arc::clone(&deps.secondary),
            Arc::clone(&state),
            cache,
            Arc::clone(&deps.clock),
            chat_id,
            config.bridge.welcome_message,
        );
        let media = MediaRelay::new(
            Arc::clone(&deps.primary),
            Arc::clone(&deps.secondary),
            deps.transcoder,
        );
        let queue = DeliveryQueue::new(config.queue.clone(), Arc::clone(&deps.clock));
        let receipts = ReadReceiptBatcher::new(config.receipts.batch_window());
        let presence = PresenceThrottle::new(config.presence.min_interval());

        info!(chat_id, "bridge engine initialized");

        Ok(Self {
            core: Arc::new(EngineCore {
                config,
                chat_id,
                primary: deps.primary,
                secondary: deps.secondary,
                clock: deps.clock,
                state,
                topics,
                media,
                queue,
                receipts,
                presence,
                was_disconnected: AtomicBool::new(false),
            }),
        })
    }

    pub fn state(&self) -> &Arc<BridgeState> {
        &self.core.state
    }

    pub fn topics(&self) -> &TopicManager {
        &self.core.topics
    }

    /// Handles one event from the primary network.
    pub async fn handle_primary_event(&self, event: PrimaryEvent) -> Result<(), BridgeError> {
        match event {
            PrimaryEvent::Message(message) => self.core.on_primary_message(message).await,
            PrimaryEvent::ConnectionUpdate(state) => {
                self.core.on_connection_update(state).await;
                Ok(())
            }
        }
    }

    /// Handles one event from the secondary platform.
    pub async fn handle_secondary_event(&self, event: SecondaryEvent) -> Result<(), BridgeError> {
        match event {
            SecondaryEvent::Message(message) => self.core.on_secondary_message(message).await,
            SecondaryEvent::Callback(callback) => {
                debug!(
                    callback_id = %callback.id,
                    sender_id = callback.sender_id,
                    data = %callback.data,
                    "ignoring callback query"
                );
                Ok(())
            }
        }
    }

    /// Runs the delivery queue until it is empty.
    pub async fn drain(&self) -> DrainSummary {
        self.core.queue.drain(self.core.as_ref()).await
    }

    /// Moves every read-receipt batch whose window has closed onto the queue.
    pub async fn flush_read_receipts(&self) -> usize {
        let now = self.core.clock.now();
        let batches = self.core.receipts.take_due(now).await;
        let count = batches.len();
        for batch in batches {
            self.core
                .queue
                .enqueue(JobPayload::ReadReceipt {
                    conversation_id: batch.conversation_id,
                    keys: batch.keys,
                })
                .await;
        }
        count
    }

    /// Adds one acknowledgement to its conversation's pending batch.
    pub async fn queue_read_receipt(&self, key: ReadKey) {
        let now = self.core.clock.now();
        self.core.receipts.add(key, now).await;
    }

    /// Stores address-book names. Returns how many were written.
    pub async fn sync_contacts(&self, contacts: &[(String, String)]) -> usize {
        let now = self.core.clock.now();
        let mut stored = 0;
        for (phone, name) in contacts {
            match self.core.state.put_contact(phone, name, now).await {
                Ok(()) => stored += 1,
                Err(e) => debug!(phone = %phone, error = %e, "contact kept in memory only"),
            }
        }
        info!(received = contacts.len(), stored, "contacts synced");
        stored
    }

    /// Verifies every mapped topic and recreates the missing ones.
    pub async fn recreate_missing_topics(&self) -> RecreateReport {
        self.core.topics.recreate_missing_topics().await
    }

    /// Purges expired message pairs and dead letters and refreshes the snapshot.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let core = &self.core;
        let now = core.clock.now();
        let window = chrono::Duration::from_std(core.config.retention.window())
            .unwrap_or_else(|_| chrono::Duration::days(7));
        let cutoff = now - window;

        let report = MaintenanceReport {
            pairs_purged: core.state.correlation().purge_older_than(cutoff).await,
            dead_letters_purged: core.queue.purge_dead_letters(cutoff).await,
            cache_entries_pruned: core.topics.prune_cache().await,
        };
        core.presence
            .prune(now, chrono::Duration::minutes(PRESENCE_RETENTION_MINUTES))
            .await;
        recording::set_message_pairs(core.state.correlation().len().await);

        if let Err(e) = core.state.save_snapshot().await {
            warn!(error = %e, "failed to refresh mappings snapshot");
        }
        info!(
            pairs_purged = report.pairs_purged,
            dead_letters_purged = report.dead_letters_purged,
            cache_entries_pruned = report.cache_entries_pruned,
            "maintenance sweep finished"
        );
        report
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.core.queue.stats().await
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.core.queue.dead_letters().await
    }

    /// Runs the event loops until `cancel` fires or an event stream ends.
    ///
    /// Background tasks drain the queue, flush read-receipt batches, and run
    /// the retention sweep. On exit the queue is closed after its current
    /// item and the mappings snapshot is saved.
    pub async fn run(
        &self,
        mut primary_events: mpsc::Receiver<PrimaryEvent>,
        mut secondary_events: mpsc::Receiver<SecondaryEvent>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        info!("bridge engine running");
        let tasks = cancel.child_token();
        let workers = [
            tokio::spawn(self.clone().drain_worker(tasks.clone())),
            tokio::spawn(self.clone().receipt_flusher(tasks.clone())),
            tokio::spawn(self.clone().maintenance_loop(tasks.clone())),
        ];

        loop {
            tokio::select! {
                event = primary_events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_primary_event(event).await {
                            error!(error = %e, "failed to handle primary event");
                        }
                    }
                    None => {
                        warn!("primary event stream ended");
                        break;
                    }
                },
                event = secondary_events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_secondary_event(event).await {
                            error!(error = %e, "failed to handle secondary event");
                        }
                    }
                    None => {
                        warn!("secondary event stream ended");
                        break;
                    }
                },
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping bridge engine");
                    break;
                }
            }
        }

        tasks.cancel();
        self.core.queue.close();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "bridge worker task failed");
            }
        }
        self.shutdown().await
    }

    /// Closes the queue and persists the mappings snapshot.
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        self.core.queue.close();
        let stats = self.core.queue.stats().await;
        if stats.pending > 0 {
            warn!(pending = stats.pending, "dropping undelivered relay items");
        }
        self.core.state.save_snapshot().await?;
        info!("bridge engine stopped");
        Ok(())
    }

    async fn drain_worker(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.core.queue.notified() => {
                    self.drain().await;
                }
            }
        }
        debug!("drain worker stopped");
    }

    async fn receipt_flusher(self, cancel: CancellationToken) {
        let period = (self.core.config.receipts.batch_window() / 4).max(Duration::from_millis(50));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush_read_receipts().await;
                }
            }
        }
    }

    async fn maintenance_loop(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.core.config.retention.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_maintenance().await;
                }
            }
        }
    }
}

/// Mapping key of the conversation a primary message belongs to.
///
/// Status updates are grouped per sender.
fn conversation_key(message: &PrimaryMessage) -> String {
    if message.is_status() {
        status_conversation_key(&message.sender_id)
    } else {
        message.conversation_id.clone()
    }
}

/// Participant recorded for read acknowledgements in multi-party conversations.
fn participant_of(message: &PrimaryMessage) -> Option<String> {
    (message.is_group() || message.is_status()).then(|| message.sender_id.clone())
}

fn with_sender(sender: &str, text: &str) -> String {
    format!("{sender}: {text}")
}

impl EngineCore {
    async fn on_primary_message(&self, message: PrimaryMessage) -> Result<(), BridgeError> {
        if message.from_me {
            debug!(message_id = %message.id, "skipping own message");
            return Ok(());
        }
        if message.is_status() && !self.config.bridge.status_sync {
            debug!(message_id = %message.id, "status sync disabled; skipping status update");
            return Ok(());
        }
        if matches!(&message.body, MessageBody::Text { text } if text.trim().is_empty()) {
            debug!(message_id = %message.id, "skipping empty message");
            return Ok(());
        }

        let now = self.clock.now();
        if let Err(e) = self
            .state
            .record_identity(&message.sender_id, message.sender_name.as_deref(), now)
            .await
        {
            debug!(error = %e, "identity kept in memory only");
        }

        // Topic lookup and creation run in the queued job so a slow forum
        // call never holds up event intake.
        self.queue
            .enqueue(JobPayload::ForwardIn { message })
            .await;
        Ok(())
    }

    /// Finds or creates the topic for a primary message's conversation.
    async fn resolve_topic(&self, message: &PrimaryMessage) -> Result<i64, BridgeError> {
        let key = conversation_key(message);
        let (name, phone) = if message.is_status() {
            (
                self.state
                    .display_name_for(&message.sender_id, message.sender_name.as_deref())
                    .await,
                phone_from_identity(&message.sender_id),
            )
        } else if message.is_group() {
            (
                self.state.display_name_for(&message.conversation_id, None).await,
                None,
            )
        } else {
            (
                self.state
                    .display_name_for(&message.conversation_id, message.sender_name.as_deref())
                    .await,
                phone_from_identity(&message.conversation_id),
            )
        };
        self.topics
            .get_or_create_topic(&key, &name, phone.as_deref())
            .await
    }

    async fn on_connection_update(&self, state: ConnectionState) {
        match state {
            ConnectionState::Connecting => debug!("primary transport connecting"),
            ConnectionState::Closed { reason } => {
                warn!(reason = reason.as_deref().unwrap_or("unknown"), "primary connection closed");
                self.was_disconnected.store(true, Ordering::SeqCst);
            }
            ConnectionState::Open => {
                if self.was_disconnected.swap(false, Ordering::SeqCst) {
                    info!("primary connection restored; reconciling topics");
                    self.topics.recreate_missing_topics().await;
                } else {
                    info!("primary connection open");
                }
            }
        }
    }

    async fn on_secondary_message(&self, message: SecondaryMessage) -> Result<(), BridgeError> {
        if message.chat_id != self.chat_id {
            debug!(chat_id = message.chat_id, "ignoring message outside the forum");
            return Ok(());
        }
        let Some(thread_id) = message.thread_id else {
            debug!(message_id = message.message_id, "ignoring message in the general topic");
            return Ok(());
        };
        let Some(conversation) = self.topics.conversation_for_topic(thread_id).await else {
            debug!(topic_id = thread_id, "ignoring message in an unmapped topic");
            return Ok(());
        };
        if !self.config.bridge.bidirectional {
            debug!(topic_id = thread_id, "bidirectional relay disabled");
            return Ok(());
        }

        // Replies in a status topic go to the sender's direct chat.
        let destination = conversation
            .strip_prefix(STATUS_KEY_PREFIX)
            .unwrap_or(&conversation)
            .to_string();

        let now = self.clock.now();
        if self.config.bridge.presence && self.presence.admit(&destination, now).await {
            self.queue
                .enqueue(JobPayload::Presence {
                    conversation_id: destination.clone(),
                    state: PresenceState::Composing,
                })
                .await;
        }

        if self.config.bridge.read_receipts {
            for key in self.unread_keys(&conversation).await {
                self.receipts.add(key, now).await;
            }
        }

        self.queue
            .enqueue(JobPayload::ForwardOut {
                message,
                conversation_id: destination,
            })
            .await;
        Ok(())
    }

    /// Read keys for the unacknowledged messages shown in a conversation's topic.
    async fn unread_keys(&self, conversation: &str) -> Vec<ReadKey> {
        let correlation = self.state.correlation();
        let pairs: Vec<MessagePair> = match conversation.strip_prefix(STATUS_KEY_PREFIX) {
            Some(sender) => correlation
                .unread_for(STATUS_BROADCAST_ID)
                .await
                .into_iter()
                .filter(|p| p.participant_id.as_deref() == Some(sender))
                .collect(),
            None => correlation.unread_for(conversation).await,
        };
        pairs
            .into_iter()
            .map(|p| ReadKey {
                conversation_id: p.conversation_id,
                message_id: p.primary_message_id,
                participant_id: p.participant_id,
            })
            .collect()
    }

    async fn forward_in(&self, message: &PrimaryMessage) -> Result<(), BridgeError> {
        let topic_id = self.resolve_topic(message).await?;
        match self.deliver_in(message, topic_id).await {
            Err(e) if e.is_missing_topic() => {
                let conversation = conversation_key(message);
                warn!(conversation = %conversation, topic_id, "topic missing during relay; recreating");
                let topic_id = self.topics.recreate_topic(&conversation).await?;
                self.deliver_in(message, topic_id).await
            }
            other => other,
        }
    }

    async fn deliver_in(&self, message: &PrimaryMessage, topic_id: i64) -> Result<(), BridgeError> {
        let reply_to = match &message.quoted_id {
            Some(quoted) => self
                .state
                .correlation()
                .resolve_from_primary(quoted, &message.conversation_id)
                .await
                .filter(|r| r.thread_id == topic_id)
                .map(|r| r.message_id),
            None => None,
        };
        let target = SecondaryTarget {
            chat_id: self.chat_id,
            thread_id: Some(topic_id),
            reply_to,
        };

        let sender = if message.is_group() {
            Some(
                self.state
                    .display_name_for(&message.sender_id, message.sender_name.as_deref())
                    .await,
            )
        } else {
            None
        };

        let message_id = match &message.body {
            MessageBody::Text { text } => {
                let text = match &sender {
                    Some(sender) => with_sender(sender, text),
                    None => text.clone(),
                };
                self.secondary.send_text(target, &text).await?
            }
            MessageBody::Media {
                descriptor,
                caption,
            } => {
                let caption = match (&sender, caption) {
                    (Some(sender), Some(caption)) => Some(with_sender(sender, caption)),
                    (_, caption) => caption.clone(),
                };
                let receipt = self
                    .media
                    .relay(
                        Network::Primary,
                        descriptor,
                        caption.as_deref(),
                        RelayDestination::Secondary(target),
                    )
                    .await?;
                match receipt.delivered {
                    DeliveredMessage::Secondary(id) => id,
                    DeliveredMessage::Primary(_) => {
                        return Err(BridgeError::Internal(
                            "media relay delivered to the wrong network".into(),
                        ));
                    }
                }
            }
        };

        let primary = PrimaryRef {
            message_id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            participant_id: participant_of(message),
        };
        let secondary = SecondaryRef {
            chat_id: self.chat_id,
            thread_id: topic_id,
            message_id,
        };
        self.record_pair(primary, secondary, message.timestamp, false)
            .await;
        if let Err(e) = self
            .state
            .touch_chat(&conversation_key(message), self.clock.now())
            .await
        {
            debug!(error = %e, "chat activity kept in memory only");
        }
        Ok(())
    }

    async fn forward_out(
        &self,
        message: &SecondaryMessage,
        conversation_id: &str,
    ) -> Result<(), BridgeError> {
        let thread_id = message.thread_id.unwrap_or_default();
        let quoted = match message.reply_to_message_id {
            Some(reply_to) => {
                self.state
                    .correlation()
                    .resolve_from_secondary(SecondaryRef {
                        chat_id: message.chat_id,
                        thread_id,
                        message_id: reply_to,
                    })
                    .await
            }
            None => None,
        };

        let primary_id = match &message.body {
            MessageBody::Text { text } => {
                self.primary
                    .send_message(
                        conversation_id,
                        OutboundContent::Text(text.clone()),
                        quoted.as_ref(),
                    )
                    .await?
            }
            MessageBody::Media {
                descriptor,
                caption,
            } => {
                let receipt = self
                    .media
                    .relay(
                        Network::Secondary,
                        descriptor,
                        caption.as_deref(),
                        RelayDestination::Primary {
                            conversation_id: conversation_id.to_string(),
                            quoted,
                        },
                    )
                    .await?;
                match receipt.delivered {
                    DeliveredMessage::Primary(id) => id,
                    DeliveredMessage::Secondary(_) => {
                        return Err(BridgeError::Internal(
                            "media relay delivered to the wrong network".into(),
                        ));
                    }
                }
            }
        };

        let primary = PrimaryRef {
            message_id: primary_id,
            conversation_id: conversation_id.to_string(),
            participant_id: None,
        };
        let secondary = SecondaryRef {
            chat_id: message.chat_id,
            thread_id,
            message_id: message.message_id,
        };
        self.record_pair(primary, secondary, message.timestamp, true)
            .await;
        Ok(())
    }

    async fn send_read_receipts(
        &self,
        conversation_id: &str,
        keys: &[ReadKey],
    ) -> Result<(), BridgeError> {
        self.primary.read_messages(keys).await?;
        let ids: Vec<String> = keys.iter().map(|k| k.message_id.clone()).collect();
        let changed = self
            .state
            .correlation()
            .mark_read(conversation_id, &ids)
            .await;
        debug!(
            conversation = %conversation_id,
            acknowledged = keys.len(),
            marked = changed.len(),
            "read receipts sent"
        );
        Ok(())
    }

    async fn record_pair(
        &self,
        primary: PrimaryRef,
        secondary: SecondaryRef,
        timestamp: chrono::DateTime<chrono::Utc>,
        mark_read: bool,
    ) {
        let correlation = self.state.correlation();
        if let Err(e) = correlation
            .record_pair(primary, secondary, timestamp, mark_read)
            .await
        {
            debug!(error = %e, "message pair kept in memory only");
        }
        recording::set_message_pairs(correlation.len().await);
    }
}

#[async_trait]
impl JobHandler for EngineCore {
    async fn handle(&self, item: &QueueItem) -> Result<(), BridgeError> {
        match &item.payload {
            JobPayload::ForwardIn { message } => self.forward_in(message).await,
            JobPayload::ForwardOut {
                message,
                conversation_id,
            } => self.forward_out(message, conversation_id).await,
            JobPayload::ReadReceipt {
                conversation_id,
                keys,
            } => self.send_read_receipts(conversation_id, keys).await,
            JobPayload::Presence {
                conversation_id,
                state,
            } => self.primary.send_presence(conversation_id, *state).await,
        }
    }
}
