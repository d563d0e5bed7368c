// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete relay pipeline.
//!
//! Gateway events enter through the signed webhook, run through the bridge
//! engine's event loop and delivery queue, and land on mock transports,
//! with mappings persisted in a temporary SQLite database.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use topicbridge_bridge::{BridgeEngine, EngineDeps};
use topicbridge_config::BridgeConfig;
use topicbridge_config::model::StorageConfig;
use topicbridge_core::types::{MessageBody, SecondaryEvent, SecondaryMessage};
use topicbridge_core::{
    Clock, MappingKind, MappingStore, PrimaryTransport, SecondaryTransport, SystemClock,
};
use topicbridge_storage::SqliteMappingStore;
use topicbridge_test_utils::{MockPrimary, MockSecondary};
use topicbridge_whatsapp::{WebhookState, router};
use tower::ServiceExt;

const CHAT: i64 = -1001;
const SECRET: &str = "e2e-secret";
const ALICE: &str = "1000@s.whatsapp.net";

fn signed_request(event: serde_json::Value) -> Request<Body> {
    let body = serde_json::to_vec(&event).unwrap();
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(&body);
    let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("x-gateway-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

/// Polls `check` until it returns true or five seconds pass.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn webhook_message_round_trips_through_a_forum_topic() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteMappingStore::new(StorageConfig {
        database_path: dir.path().join("bridge.db").display().to_string(),
        wal_mode: true,
    }));
    store.initialize().await.unwrap();

    let primary = Arc::new(MockPrimary::new());
    let secondary = Arc::new(MockSecondary::new());

    let mut config = BridgeConfig::default();
    config.telegram.chat_id = Some(CHAT);
    config.queue.inter_item_delay_ms = 0;

    let engine = BridgeEngine::new(
        config,
        EngineDeps {
            primary: Arc::clone(&primary) as Arc<dyn PrimaryTransport>,
            secondary: Arc::clone(&secondary) as Arc<dyn SecondaryTransport>,
            store: Arc::clone(&store) as Arc<dyn MappingStore>,
            clock: Arc::new(SystemClock) as Arc<dyn Clock>,
            transcoder: None,
        },
    )
    .await
    .unwrap();

    let cancel = CancellationToken::new();
    let (primary_tx, primary_rx) = mpsc::channel(16);
    let (secondary_tx, secondary_rx) = mpsc::channel(16);
    let app = router(WebhookState::new(primary_tx, Some(SECRET)).unwrap());

    let running = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { engine.run(primary_rx, secondary_rx, cancel).await })
    };

    // Inbound: gateway -> webhook -> engine -> new forum topic.
    let response = app
        .oneshot(signed_request(serde_json::json!({
            "type": "message",
            "payload": {
                "id": "3EB0A1",
                "conversation_id": ALICE,
                "sender_id": ALICE,
                "sender_name": "Alice",
                "timestamp": "2026-01-05T10:00:00Z",
                "body": { "type": "text", "text": "Hello" },
            }
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    eventually(|| {
        let secondary = Arc::clone(&secondary);
        async move {
            secondary
                .calls()
                .await
                .iter()
                .any(|call| call.text() == Some("Hello"))
        }
    })
    .await;

    let topics = secondary.created_topics().await;
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].name, "Alice");
    let thread = topics[0].thread_id;

    // Outbound: a forum reply in that topic reaches Alice.
    secondary_tx
        .send(SecondaryEvent::Message(SecondaryMessage {
            chat_id: CHAT,
            thread_id: Some(thread),
            message_id: 5000,
            sender_id: 42,
            sender_name: "Operator".into(),
            timestamp: chrono::Utc::now(),
            body: MessageBody::Text {
                text: "Hi Alice".into(),
            },
            reply_to_message_id: None,
        }))
        .await
        .unwrap();

    eventually(|| {
        let primary = Arc::clone(&primary);
        async move { !primary.sent_messages().await.is_empty() }
    })
    .await;

    let sent = primary.sent_messages().await;
    assert_eq!(sent[0].conversation_id, ALICE);
    assert_eq!(sent[0].text(), Some("Hi Alice"));

    cancel.cancel();
    running.await.unwrap().unwrap();

    // Mappings survive in SQLite after shutdown.
    let chat = store.find(MappingKind::Chat, ALICE).await.unwrap();
    assert_eq!(chat.unwrap()["secondary_topic_id"], thread);
    let pair = store.find(MappingKind::MessagePair, "3EB0A1").await.unwrap();
    assert!(pair.is_some());
    store.close().await.unwrap();
}

#[tokio::test]
async fn unsigned_webhook_requests_never_reach_the_engine() {
    let (primary_tx, mut primary_rx) = mpsc::channel(4);
    let app = router(WebhookState::new(primary_tx, Some(SECRET)).unwrap());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(primary_rx.try_recv().is_err());
}
