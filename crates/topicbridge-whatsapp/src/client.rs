// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the WhatsApp Web gateway sidecar.
//!
//! The sidecar owns the WhatsApp session (pairing, encryption, reconnects)
//! and exposes a small REST API. [`GatewayClient`] implements
//! [`PrimaryTransport`] on top of it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use topicbridge_config::model::WhatsAppConfig;
use topicbridge_core::error::BridgeError;
use topicbridge_core::traits::{PluginAdapter, PrimaryTransport};
use topicbridge_core::types::{
    AdapterType, HealthStatus, MediaDescriptor, Network, OutboundContent, PresenceState,
    PrimaryRef, ReadKey,
};
use tracing::debug;

use crate::wire::{
    GatewayHealth, PresenceRequest, ReadRequest, SendMessageRequest, SendMessageResponse,
};

/// HTTP client for gateway communication.
///
/// Manages the bearer token header, connection pooling, and per-request
/// timeouts. Retries are left to the bridge's delivery queue.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GatewayClient {
    /// Creates a new gateway client from the `[whatsapp]` section.
    pub fn new(config: &WhatsAppConfig) -> Result<Self, BridgeError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = config.api_token.as_deref() {
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                    BridgeError::Config(format!("invalid gateway API token header value: {e}"))
                })?,
            );
        }

        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Transport {
                network: Network::Primary,
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, BridgeError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(path, e))?;
        let response = check_status(path, response).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| self.request_error(path, e))
    }

    async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), BridgeError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(path, e))?;
        check_status(path, response).await?;
        Ok(())
    }

    fn request_error(&self, path: &str, e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            return BridgeError::Timeout {
                duration: self.timeout,
            };
        }
        BridgeError::Transport {
            network: Network::Primary,
            message: format!("gateway request {path} failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

/// Turns a non-success response into a transport error carrying the body.
async fn check_status(
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, BridgeError> {
    let status = response.status();
    debug!(status = %status, path, "gateway response received");
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BridgeError::transport(
        Network::Primary,
        format!("gateway {path} returned {status}: {body}"),
    ))
}

#[async_trait]
impl PluginAdapter for GatewayClient {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::PrimaryTransport
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        let response = match self.client.get(self.url("/health")).send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(HealthStatus::Unhealthy(format!(
                    "WhatsApp gateway unreachable: {e}"
                )));
            }
        };
        if !response.status().is_success() {
            return Ok(HealthStatus::Unhealthy(format!(
                "WhatsApp gateway returned {}",
                response.status()
            )));
        }
        match response.json::<GatewayHealth>().await {
            Ok(health) if health.connected => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Degraded(
                "gateway is up but not connected to WhatsApp".into(),
            )),
            Err(e) => Ok(HealthStatus::Degraded(format!(
                "unreadable gateway health response: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        debug!("WhatsApp gateway client shutting down");
        Ok(())
    }
}

#[async_trait]
impl PrimaryTransport for GatewayClient {
    async fn send_message(
        &self,
        conversation_id: &str,
        content: OutboundContent,
        quoted: Option<&PrimaryRef>,
    ) -> Result<String, BridgeError> {
        let request = SendMessageRequest {
            conversation_id,
            content: content.into(),
            quoted: quoted.map(Into::into),
        };
        let response: SendMessageResponse = self.post_json("/messages", &request).await?;
        Ok(response.id)
    }

    async fn download_media(&self, descriptor: &MediaDescriptor) -> Result<Vec<u8>, BridgeError> {
        let path = format!("/media/{}", descriptor.source_id);
        let response = self
            .client
            .get(self.url(&path))
            .send()
            .await
            .map_err(|e| self.request_error(&path, e))?;
        let response = check_status(&path, response).await?;
        let bytes = response.bytes().await.map_err(|e| BridgeError::Media {
            message: format!("failed to read media body: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(
            source_id = %descriptor.source_id,
            size = bytes.len(),
            "downloaded media from gateway"
        );
        Ok(bytes.to_vec())
    }

    async fn read_messages(&self, keys: &[ReadKey]) -> Result<(), BridgeError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.post_unit("/read", &ReadRequest { keys }).await
    }

    async fn send_presence(
        &self,
        conversation_id: &str,
        state: PresenceState,
    ) -> Result<(), BridgeError> {
        self.post_unit(
            "/presence",
            &PresenceRequest {
                conversation_id,
                state,
            },
        )
        .await
    }
}
