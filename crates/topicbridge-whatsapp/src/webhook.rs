// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook listener for gateway events built on axum.
//!
//! The gateway posts every message and connection update as a JSON
//! [`PrimaryEvent`], signed with HMAC-SHA256 over the raw body. Requests
//! with a missing or wrong signature are rejected before parsing.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use topicbridge_core::error::BridgeError;
use topicbridge_core::types::{Network, PrimaryEvent};
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded body signature, optionally `sha256=`-prefixed.
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Shared state for the webhook handler.
#[derive(Clone)]
pub struct WebhookState {
    events: mpsc::Sender<PrimaryEvent>,
    secret: Arc<[u8]>,
}

impl std::fmt::Debug for WebhookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookState")
            .field("secret", &"[redacted]")
            .finish()
    }
}

impl WebhookState {
    /// Creates webhook state. A webhook without a secret is refused (fail-closed).
    pub fn new(
        events: mpsc::Sender<PrimaryEvent>,
        secret: Option<&str>,
    ) -> Result<Self, BridgeError> {
        let secret = secret.filter(|s| !s.is_empty()).ok_or_else(|| {
            BridgeError::Config("whatsapp.webhook_secret is required to accept gateway events".into())
        })?;
        Ok(Self {
            events,
            secret: Arc::from(secret.as_bytes()),
        })
    }
}

/// Checks an `X-Gateway-Signature` value against the raw request body.
///
/// Comparison is constant-time.
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let hex_sig = signature.trim();
    let hex_sig = hex_sig.strip_prefix("sha256=").unwrap_or(hex_sig);
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// POST /webhook handler.
pub async fn receive_event(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let Some(signature) = signature else {
        debug!("webhook request without signature rejected");
        return StatusCode::UNAUTHORIZED;
    };
    if !verify_signature(&state.secret, &body, signature) {
        warn!("webhook request with invalid signature rejected");
        return StatusCode::UNAUTHORIZED;
    }

    let event: PrimaryEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "malformed gateway event");
            return StatusCode::BAD_REQUEST;
        }
    };

    if state.events.send(event).await.is_err() {
        warn!("primary event channel closed, dropping gateway event");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    StatusCode::ACCEPTED
}

/// Builds the webhook router.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(receive_event))
        .with_state(state)
}

/// Binds `bind` and serves the webhook until `cancel` fires.
pub async fn serve(
    bind: &str,
    state: WebhookState,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| BridgeError::Transport {
            network: Network::Primary,
            message: format!("failed to bind webhook to {bind}: {e}"),
            source: Some(Box::new(e)),
        })?;

    info!("gateway webhook listening on {bind}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| BridgeError::Transport {
            network: Network::Primary,
            message: format!("webhook server error: {e}"),
            source: Some(Box::new(e)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use topicbridge_core::types::{ConnectionState, MessageBody};
    use tower::ServiceExt;

    const SECRET: &str = "whsec-test";

    fn sign(body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn message_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": "message",
            "payload": {
                "id": "3EB0A1",
                "conversation_id": "1000@s.whatsapp.net",
                "sender_id": "1000@s.whatsapp.net",
                "sender_name": "Alice",
                "timestamp": "2026-01-05T10:00:00Z",
                "body": { "type": "text", "text": "Hello" },
            }
        }))
        .unwrap()
    }

    fn request(body: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/webhook");
        if let Some(sig) = signature {
            builder = builder.header(SIGNATURE_HEADER, sig);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[test]
    fn signature_accepts_plain_and_prefixed_hex() {
        let body = b"payload";
        let prefixed = sign(body);
        let plain = prefixed.trim_start_matches("sha256=").to_string();
        assert!(verify_signature(SECRET.as_bytes(), body, &prefixed));
        assert!(verify_signature(SECRET.as_bytes(), body, &plain));
        assert!(!verify_signature(SECRET.as_bytes(), b"tampered", &prefixed));
        assert!(!verify_signature(SECRET.as_bytes(), body, "not-hex"));
    }

    #[test]
    fn state_requires_secret() {
        let (tx, _rx) = mpsc::channel(1);
        assert!(WebhookState::new(tx.clone(), None).is_err());
        assert!(WebhookState::new(tx.clone(), Some("")).is_err());
        let state = WebhookState::new(tx, Some(SECRET)).unwrap();
        assert!(!format!("{state:?}").contains(SECRET));
    }

    #[tokio::test]
    async fn signed_message_is_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        let app = router(WebhookState::new(tx, Some(SECRET)).unwrap());

        let body = message_body();
        let sig = sign(&body);
        let response = app.oneshot(request(body, Some(sig))).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        match rx.recv().await.unwrap() {
            PrimaryEvent::Message(msg) => {
                assert_eq!(msg.id, "3EB0A1");
                assert_eq!(msg.sender_name.as_deref(), Some("Alice"));
                assert!(!msg.from_me);
                assert_eq!(msg.body, MessageBody::Text { text: "Hello".into() });
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsigned_or_forged_requests_are_rejected() {
        let (tx, mut rx) = mpsc::channel(4);
        let app = router(WebhookState::new(tx, Some(SECRET)).unwrap());

        let response = app
            .clone()
            .oneshot(request(message_body(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let forged = sign(b"something else");
        let response = app.oneshot(request(message_body(), Some(forged))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connection_updates_are_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        let app = router(WebhookState::new(tx, Some(SECRET)).unwrap());

        let body = serde_json::to_vec(&serde_json::json!({
            "type": "connection_update",
            "payload": { "state": "closed", "reason": "stream replaced" }
        }))
        .unwrap();
        let sig = sign(&body);
        let response = app.oneshot(request(body, Some(sig))).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            rx.recv().await.unwrap(),
            PrimaryEvent::ConnectionUpdate(ConnectionState::Closed {
                reason: Some("stream replaced".into())
            })
        );
    }

    #[tokio::test]
    async fn malformed_events_are_bad_requests() {
        let (tx, _rx) = mpsc::channel(4);
        let app = router(WebhookState::new(tx, Some(SECRET)).unwrap());

        let body = b"{\"type\":\"unknown\"}".to_vec();
        let sig = sign(&body);
        let response = app.oneshot(request(body, Some(sig))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
