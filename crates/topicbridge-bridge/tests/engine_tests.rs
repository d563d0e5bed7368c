// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end relay scenarios against mock transports.

use std::sync::Arc;
use std::time::Duration;

use topicbridge_bridge::{BridgeEngine, EngineDeps};
use topicbridge_config::model::{BridgeConfig, StorageConfig};
use topicbridge_core::types::{
    CallbackQuery, ConnectionState, MediaDescriptor, MediaKind, MessageBody, MessagePair,
    PrimaryEvent, PrimaryMessage, PrimaryRef, STATUS_BROADCAST_ID, SecondaryEvent,
    SecondaryMessage, SecondaryRef,
};
use topicbridge_core::{
    BridgeError, Clock, MappingKind, MappingStore, PrimaryTransport, SecondaryTransport,
};
use topicbridge_storage::SqliteMappingStore;
use topicbridge_test_utils::{FakeClock, InMemoryStore, MockPrimary, MockSecondary, SecondaryCall};

const CHAT: i64 = -1001;
const ALICE: &str = "1000@s.whatsapp.net";

struct Harness {
    engine: BridgeEngine,
    primary: Arc<MockPrimary>,
    secondary: Arc<MockSecondary>,
    store: Arc<InMemoryStore>,
    clock: Arc<FakeClock>,
}

fn config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.telegram.chat_id = Some(CHAT);
    config.queue.inter_item_delay_ms = 0;
    config
}

async fn harness_with(config: BridgeConfig) -> Harness {
    let primary = Arc::new(MockPrimary::new());
    let secondary = Arc::new(MockSecondary::new());
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(FakeClock::new());
    let engine = BridgeEngine::new(
        config,
        EngineDeps {
            primary: Arc::clone(&primary) as Arc<dyn PrimaryTransport>,
            secondary: Arc::clone(&secondary) as Arc<dyn SecondaryTransport>,
            store: Arc::clone(&store) as Arc<dyn MappingStore>,
            clock: Arc::clone(&clock) as Arc<dyn Clock>,
            transcoder: None,
        },
    )
    .await
    .unwrap();
    Harness {
        engine,
        primary,
        secondary,
        store,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with(config()).await
}

impl Harness {
    fn incoming(&self, id: &str, conversation: &str, text: &str) -> PrimaryMessage {
        PrimaryMessage {
            id: id.into(),
            conversation_id: conversation.into(),
            sender_id: conversation.into(),
            sender_name: Some("Alice".into()),
            from_me: false,
            timestamp: self.clock.now(),
            body: MessageBody::Text { text: text.into() },
            quoted_id: None,
        }
    }

    fn forum_message(&self, thread_id: i64, message_id: i64, text: &str) -> SecondaryMessage {
        SecondaryMessage {
            chat_id: CHAT,
            thread_id: Some(thread_id),
            message_id,
            sender_id: 42,
            sender_name: "operator".into(),
            timestamp: self.clock.now(),
            body: MessageBody::Text { text: text.into() },
            reply_to_message_id: None,
        }
    }

    async fn receive(&self, message: PrimaryMessage) {
        self.engine
            .handle_primary_event(PrimaryEvent::Message(message))
            .await
            .unwrap();
    }

    async fn reply(&self, message: SecondaryMessage) {
        self.engine
            .handle_secondary_event(SecondaryEvent::Message(message))
            .await
            .unwrap();
    }

    async fn topic_of(&self, conversation: &str) -> i64 {
        self.engine
            .state()
            .chat(conversation)
            .await
            .unwrap()
            .secondary_topic_id
    }
}

#[tokio::test]
async fn first_message_creates_topic_and_is_relayed() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "hello")).await;
    let summary = h.engine.drain().await;
    assert_eq!(summary.delivered, 1);

    let created = h.secondary.created_topics().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "Alice");
    let topic = created[0].thread_id;

    let calls = h.secondary.calls_in(topic).await;
    assert_eq!(calls.len(), 2);
    assert!(calls[0].text().unwrap().contains(ALICE));
    assert_eq!(calls[1].text(), Some("hello"));

    assert_eq!(
        h.engine
            .state()
            .correlation()
            .resolve_from_primary("P1", ALICE)
            .await,
        Some(SecondaryRef {
            chat_id: CHAT,
            thread_id: topic,
            message_id: calls[1].message_id(),
        })
    );
    assert_eq!(h.engine.state().identity(ALICE).await.unwrap().message_count, 1);
    assert!(h.store.get(MappingKind::Chat, ALICE).is_some());
}

#[tokio::test]
async fn second_message_reuses_the_topic() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "one")).await;
    h.receive(h.incoming("P2", ALICE, "two")).await;
    h.engine.drain().await;

    assert_eq!(h.secondary.created_topics().await.len(), 1);
    let topic = h.topic_of(ALICE).await;
    let texts: Vec<_> = h
        .secondary
        .calls_in(topic)
        .await
        .iter()
        .skip(1)
        .map(|c| c.text().unwrap().to_string())
        .collect();
    assert_eq!(texts, vec!["one", "two"]);
}

#[tokio::test]
async fn own_and_status_messages_are_skipped_by_default() {
    let h = harness().await;
    let mut own = h.incoming("P1", ALICE, "mine");
    own.from_me = true;
    h.receive(own).await;

    let mut status = h.incoming("S1", STATUS_BROADCAST_ID, "my day");
    status.sender_id = ALICE.into();
    h.receive(status).await;

    assert_eq!(h.engine.drain().await.processed(), 0);
    assert!(h.secondary.created_topics().await.is_empty());
}

#[tokio::test]
async fn forum_reply_failing_twice_then_succeeding_is_delivered() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "hello")).await;
    h.engine.drain().await;
    let topic = h.topic_of(ALICE).await;

    h.primary.fail_next_sends(2);
    h.reply(h.forum_message(topic, 5000, "thanks")).await;
    let summary = h.engine.drain().await;

    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.requeued, 2);
    assert_eq!(summary.dead_lettered, 0);
    assert_eq!(
        h.clock.non_zero_sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    assert_eq!(h.primary.send_attempts(), 3);

    let sent = h.primary.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].conversation_id, ALICE);
    assert_eq!(sent[0].text(), Some("thanks"));

    let pair = h
        .engine
        .state()
        .correlation()
        .resolve_from_secondary(SecondaryRef {
            chat_id: CHAT,
            thread_id: topic,
            message_id: 5000,
        })
        .await
        .unwrap();
    assert_eq!(pair.message_id, "MOCK0001");
}

#[tokio::test]
async fn forum_reply_failing_every_attempt_is_dead_lettered() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "hello")).await;
    h.engine.drain().await;
    let topic = h.topic_of(ALICE).await;

    h.primary.fail_next_sends(3);
    h.reply(h.forum_message(topic, 5000, "thanks")).await;
    let summary = h.engine.drain().await;

    assert_eq!(summary.dead_lettered, 1);
    let dead = h.engine.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].item.retries, 3);
    assert!(h.primary.sent_messages().await.is_empty());
}

#[tokio::test]
async fn replies_are_threaded_in_both_directions() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "question?")).await;
    h.engine.drain().await;
    let topic = h.topic_of(ALICE).await;
    let relayed = h.secondary.calls_in(topic).await[1].message_id();

    let mut answer = h.forum_message(topic, 5000, "answer");
    answer.reply_to_message_id = Some(relayed);
    h.reply(answer).await;
    h.engine.drain().await;

    let sent = h.primary.sent_messages().await;
    assert_eq!(
        sent[0].quoted,
        Some(PrimaryRef {
            message_id: "P1".into(),
            conversation_id: ALICE.into(),
            participant_id: None,
        })
    );

    // A primary reply quoting the forum answer threads under it.
    let mut follow_up = h.incoming("P2", ALICE, "got it");
    follow_up.quoted_id = Some("MOCK0001".into());
    h.receive(follow_up).await;
    h.engine.drain().await;

    let calls = h.secondary.calls_in(topic).await;
    assert_eq!(calls.last().unwrap().target().reply_to, Some(5000));
}

#[tokio::test]
async fn answering_in_a_topic_marks_its_messages_read_in_one_batch() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "one")).await;
    h.receive(h.incoming("P2", ALICE, "two")).await;
    h.engine.drain().await;
    let topic = h.topic_of(ALICE).await;

    h.reply(h.forum_message(topic, 5000, "ok")).await;
    h.engine.drain().await;
    assert_eq!(h.engine.flush_read_receipts().await, 0);

    h.clock.advance(Duration::from_secs(2));
    assert_eq!(h.engine.flush_read_receipts().await, 1);
    h.engine.drain().await;

    let batches = h.primary.read_batches().await;
    assert_eq!(batches.len(), 1);
    let mut ids: Vec<_> = batches[0].iter().map(|k| k.message_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["P1", "P2"]);
    assert!(h.engine.state().correlation().unread_for(ALICE).await.is_empty());
}

#[tokio::test]
async fn read_receipts_can_be_disabled() {
    let mut config = config();
    config.bridge.read_receipts = false;
    let h = harness_with(config).await;
    h.receive(h.incoming("P1", ALICE, "one")).await;
    h.engine.drain().await;
    let topic = h.topic_of(ALICE).await;

    h.reply(h.forum_message(topic, 5000, "ok")).await;
    h.clock.advance(Duration::from_secs(5));
    assert_eq!(h.engine.flush_read_receipts().await, 0);
}

#[tokio::test]
async fn presence_is_throttled_per_conversation() {
    let mut config = config();
    config.bridge.presence = true;
    config.bridge.read_receipts = false;
    let h = harness_with(config).await;
    h.receive(h.incoming("P1", ALICE, "hi")).await;
    h.engine.drain().await;
    let topic = h.topic_of(ALICE).await;

    h.reply(h.forum_message(topic, 5000, "a")).await;
    h.reply(h.forum_message(topic, 5001, "b")).await;
    h.clock.advance(Duration::from_secs(1));
    h.reply(h.forum_message(topic, 5002, "c")).await;
    h.engine.drain().await;

    assert_eq!(h.primary.presence_updates().await.len(), 2);
    assert_eq!(h.primary.sent_messages().await.len(), 3);
}

#[tokio::test]
async fn deleted_topic_is_recreated_when_a_send_hits_it() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "one")).await;
    h.engine.drain().await;
    let old = h.topic_of(ALICE).await;

    h.secondary.delete_topic(old).await;
    h.receive(h.incoming("P2", ALICE, "two")).await;
    let summary = h.engine.drain().await;

    assert_eq!(summary.delivered, 1);
    let new = h.topic_of(ALICE).await;
    assert_ne!(old, new);
    let calls = h.secondary.calls_in(new).await;
    assert_eq!(calls.last().unwrap().text(), Some("two"));
}

#[tokio::test]
async fn reconnect_recreates_missing_topics() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "one")).await;
    h.receive(h.incoming("B1", "2000@s.whatsapp.net", "hey")).await;
    h.engine.drain().await;
    let alice_topic = h.topic_of(ALICE).await;
    let bob_topic = h.topic_of("2000@s.whatsapp.net").await;
    h.secondary.delete_topic(alice_topic).await;

    h.engine
        .handle_primary_event(PrimaryEvent::ConnectionUpdate(ConnectionState::Closed {
            reason: Some("stream errored".into()),
        }))
        .await
        .unwrap();
    h.engine
        .handle_primary_event(PrimaryEvent::ConnectionUpdate(ConnectionState::Open))
        .await
        .unwrap();

    assert_ne!(h.topic_of(ALICE).await, alice_topic);
    assert_eq!(h.topic_of("2000@s.whatsapp.net").await, bob_topic);
    assert_eq!(h.secondary.created_topics().await.len(), 3);
}

#[tokio::test]
async fn first_open_does_not_reconcile() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "one")).await;
    h.engine.drain().await;
    let probes = h.secondary.probe_count();

    h.engine
        .handle_primary_event(PrimaryEvent::ConnectionUpdate(ConnectionState::Open))
        .await
        .unwrap();
    assert_eq!(h.secondary.probe_count(), probes);
}

#[tokio::test]
async fn status_updates_get_per_sender_topics_and_replies_go_direct() {
    let mut config = config();
    config.bridge.status_sync = true;
    let h = harness_with(config).await;

    let mut status = h.incoming("S1", STATUS_BROADCAST_ID, "my day");
    status.sender_id = ALICE.into();
    h.receive(status).await;
    h.engine.drain().await;

    let created = h.secondary.created_topics().await;
    assert_eq!(created[0].name, "Status: Alice");
    let topic = h.topic_of(&format!("status:{ALICE}")).await;

    h.reply(h.forum_message(topic, 5000, "nice")).await;
    h.engine.drain().await;
    assert_eq!(h.primary.sent_messages().await[0].conversation_id, ALICE);
}

#[tokio::test]
async fn group_messages_carry_the_author() {
    let h = harness().await;
    let mut message = h.incoming("G1", "123-456@g.us", "hi all");
    message.sender_id = ALICE.into();
    h.receive(message).await;
    h.engine.drain().await;

    let topic = h.topic_of("123-456@g.us").await;
    let calls = h.secondary.calls_in(topic).await;
    assert_eq!(calls.last().unwrap().text(), Some("Alice: hi all"));
}

#[tokio::test]
async fn failed_video_download_relays_the_caption() {
    let h = harness().await;
    h.primary.fail_next_downloads(1);
    let mut video = h.incoming("V1", ALICE, "");
    video.body = MessageBody::Media {
        descriptor: MediaDescriptor {
            source_id: "media-1".into(),
            kind: MediaKind::Video,
            mime_type: Some("video/mp4".into()),
            file_name: None,
            voice_note: false,
        },
        caption: Some("birthday party".into()),
    };
    h.receive(video).await;
    let summary = h.engine.drain().await;

    assert_eq!(summary.delivered, 1);
    let topic = h.topic_of(ALICE).await;
    let calls = h.secondary.calls_in(topic).await;
    assert!(matches!(
        calls.last().unwrap(),
        SecondaryCall::Text { text, .. } if text.contains("birthday party")
    ));
    // The fallback text is still correlated with the original message.
    assert!(
        h.engine
            .state()
            .correlation()
            .resolve_from_primary("V1", ALICE)
            .await
            .is_some()
    );
}

#[tokio::test]
async fn messages_outside_mapped_topics_are_ignored() {
    let h = harness().await;
    h.reply(h.forum_message(999, 5000, "stray")).await;

    let mut general = h.forum_message(1, 5001, "general");
    general.thread_id = None;
    h.reply(general).await;

    let mut elsewhere = h.forum_message(1, 5002, "elsewhere");
    elsewhere.chat_id = -2002;
    h.reply(elsewhere).await;

    h.engine
        .handle_secondary_event(SecondaryEvent::Callback(CallbackQuery {
            id: "cb".into(),
            chat_id: Some(CHAT),
            sender_id: 42,
            data: "noop".into(),
        }))
        .await
        .unwrap();

    assert_eq!(h.engine.drain().await.processed(), 0);
}

#[tokio::test]
async fn contact_names_take_precedence_for_new_topics() {
    let h = harness().await;
    assert_eq!(
        h.engine
            .sync_contacts(&[("1000".to_string(), "Alice Liddell".to_string())])
            .await,
        1
    );
    h.receive(h.incoming("P1", ALICE, "hello")).await;
    h.engine.drain().await;
    assert_eq!(h.secondary.created_topics().await[0].name, "Alice Liddell");
}

#[tokio::test]
async fn intake_does_not_touch_the_forum_before_draining() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "hello")).await;
    h.receive(h.incoming("P2", "2000@s.whatsapp.net", "hi")).await;

    assert!(h.secondary.created_topics().await.is_empty());
    assert!(h.secondary.calls().await.is_empty());
    assert_eq!(h.engine.queue_stats().await.pending, 2);

    assert_eq!(h.engine.drain().await.delivered, 2);
    assert_eq!(h.secondary.created_topics().await.len(), 2);
}

#[tokio::test]
async fn maintenance_purges_expired_pairs_and_saves_a_snapshot() {
    let h = harness().await;
    h.receive(h.incoming("P1", ALICE, "old")).await;
    h.engine.drain().await;

    h.clock.advance(Duration::from_secs(8 * 24 * 60 * 60));
    h.receive(h.incoming("P2", ALICE, "new")).await;
    h.engine.drain().await;

    let report = h.engine.run_maintenance().await;
    assert_eq!(report.pairs_purged, 1);
    let pairs: Vec<MessagePair> = h.engine.state().correlation().pairs().await;
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].primary_message_id, "P2");
    assert!(h.store.get(MappingKind::MessagePair, "P1").is_none());
    assert!(h.store.load_snapshot().await.unwrap().is_some());
}

#[tokio::test]
async fn store_failures_do_not_block_relay() {
    let h = harness().await;
    h.store.set_fail_writes(true);
    h.receive(h.incoming("P1", ALICE, "hello")).await;
    let summary = h.engine.drain().await;

    assert_eq!(summary.delivered, 1);
    assert!(h.engine.state().chat(ALICE).await.is_some());
    assert_eq!(h.store.count(MappingKind::Chat), 0);
}

#[tokio::test]
async fn missing_forum_chat_is_a_config_error() {
    let config = BridgeConfig::default();
    let result = BridgeEngine::new(
        config,
        EngineDeps {
            primary: Arc::new(MockPrimary::new()),
            secondary: Arc::new(MockSecondary::new()),
            store: Arc::new(InMemoryStore::new()),
            clock: Arc::new(FakeClock::new()),
            transcoder: None,
        },
    )
    .await;
    assert!(matches!(result, Err(BridgeError::Config(_))));
}

#[tokio::test]
async fn mappings_survive_a_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageConfig {
        database_path: dir.path().join("bridge.db").to_string_lossy().into_owned(),
        wal_mode: true,
    };
    let secondary = Arc::new(MockSecondary::new());
    let clock = Arc::new(FakeClock::new());

    let topic = {
        let store = Arc::new(SqliteMappingStore::new(storage.clone()));
        store.initialize().await.unwrap();
        let engine = BridgeEngine::new(
            config(),
            EngineDeps {
                primary: Arc::new(MockPrimary::new()),
                secondary: Arc::clone(&secondary) as Arc<dyn SecondaryTransport>,
                store: Arc::clone(&store) as Arc<dyn MappingStore>,
                clock: Arc::clone(&clock) as Arc<dyn Clock>,
                transcoder: None,
            },
        )
        .await
        .unwrap();
        engine
            .handle_primary_event(PrimaryEvent::Message(PrimaryMessage {
                id: "P1".into(),
                conversation_id: ALICE.into(),
                sender_id: ALICE.into(),
                sender_name: Some("Alice".into()),
                from_me: false,
                timestamp: clock.now(),
                body: MessageBody::Text {
                    text: "hello".into(),
                },
                quoted_id: None,
            }))
            .await
            .unwrap();
        engine.drain().await;
        engine.shutdown().await.unwrap();
        store.close().await.unwrap();
        secondary.created_topics().await[0].thread_id
    };

    let store = Arc::new(SqliteMappingStore::new(storage));
    store.initialize().await.unwrap();
    let engine = BridgeEngine::new(
        config(),
        EngineDeps {
            primary: Arc::new(MockPrimary::new()),
            secondary: Arc::clone(&secondary) as Arc<dyn SecondaryTransport>,
            store: Arc::clone(&store) as Arc<dyn MappingStore>,
            clock: Arc::clone(&clock) as Arc<dyn Clock>,
            transcoder: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(
        engine.state().chat(ALICE).await.unwrap().secondary_topic_id,
        topic
    );
    assert_eq!(
        engine
            .state()
            .correlation()
            .resolve_from_primary("P1", ALICE)
            .await
            .map(|r| r.thread_id),
        Some(topic)
    );
    assert_eq!(engine.state().identity(ALICE).await.unwrap().message_count, 1);
}
