// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `topicbridge serve` command implementation.
//!
//! Opens the mapping store, wires the WhatsApp gateway client and webhook,
//! the Telegram forum transport, and the bridge engine, then runs until a
//! shutdown signal arrives.

use std::sync::Arc;

use tokio::sync::mpsc;
use topicbridge_bridge::{BridgeEngine, EngineDeps, FfmpegTranscoder, Transcoder};
use topicbridge_config::BridgeConfig;
use topicbridge_core::error::BridgeError;
use topicbridge_core::{
    Clock, HealthStatus, MappingStore, PluginAdapter, PrimaryTransport, SecondaryTransport,
    SystemClock,
};
use topicbridge_storage::SqliteMappingStore;
use topicbridge_telegram::TelegramTransport;
use topicbridge_whatsapp::{GatewayClient, WebhookState};
use tracing::{error, info, warn};

use crate::shutdown;

/// Capacity of each inbound event channel.
const EVENT_BUFFER: usize = 256;

/// Runs the `topicbridge serve` command.
pub async fn run_serve(config: BridgeConfig) -> Result<(), BridgeError> {
    init_tracing(&config.bridge.log_level);

    info!("starting topicbridge serve");

    let store = Arc::new(SqliteMappingStore::new(config.storage.clone()));
    store.initialize().await?;

    let primary = Arc::new(GatewayClient::new(&config.whatsapp)?);
    let secondary = Arc::new(TelegramTransport::new(config.telegram.clone())?);
    log_health(primary.as_ref()).await;
    log_health(secondary.as_ref()).await;

    let transcoder = config.media.transcode_voice.then(|| {
        Arc::new(FfmpegTranscoder::new(config.media.ffmpeg_path.clone())) as Arc<dyn Transcoder>
    });

    let engine = BridgeEngine::new(
        config.clone(),
        EngineDeps {
            primary: Arc::clone(&primary) as Arc<dyn PrimaryTransport>,
            secondary: Arc::clone(&secondary) as Arc<dyn SecondaryTransport>,
            store: Arc::clone(&store) as Arc<dyn MappingStore>,
            clock: Arc::new(SystemClock) as Arc<dyn Clock>,
            transcoder,
        },
    )
    .await?;

    let cancel = shutdown::install_signal_handler();
    let (primary_tx, primary_rx) = mpsc::channel(EVENT_BUFFER);
    let (secondary_tx, secondary_rx) = mpsc::channel(EVENT_BUFFER);

    let webhook_state = WebhookState::new(primary_tx, config.whatsapp.webhook_secret.as_deref())?;
    let webhook = {
        let bind = config.whatsapp.webhook_bind.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = topicbridge_whatsapp::serve(&bind, webhook_state, cancel.clone()).await;
            if let Err(e) = &result {
                error!(error = %e, "gateway webhook stopped, shutting down");
                cancel.cancel();
            }
            result
        })
    };

    secondary.start(secondary_tx, cancel.clone());

    let result = engine.run(primary_rx, secondary_rx, cancel.clone()).await;
    cancel.cancel();

    match webhook.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "gateway webhook exited with error"),
        Err(e) => warn!(error = %e, "gateway webhook task failed"),
    }
    if let Err(e) = secondary.shutdown().await {
        warn!(error = %e, "Telegram transport shutdown failed");
    }
    if let Err(e) = store.shutdown().await {
        warn!(error = %e, "storage checkpoint failed");
    }
    store.close().await?;

    info!("topicbridge stopped");
    result
}

async fn log_health(adapter: &dyn PluginAdapter) {
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => info!(adapter = adapter.name(), "adapter healthy"),
        Ok(HealthStatus::Degraded(reason)) => {
            warn!(adapter = adapter.name(), reason = %reason, "adapter degraded")
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            warn!(adapter = adapter.name(), reason = %reason, "adapter unhealthy")
        }
        Err(e) => warn!(adapter = adapter.name(), error = %e, "adapter health check failed"),
    }
}

/// Initializes the tracing subscriber with an environment filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("topicbridge={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
