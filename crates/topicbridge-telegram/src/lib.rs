// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram forum adapter for the topicbridge relay.
//!
//! Implements [`SecondaryTransport`] for the Telegram Bot API via teloxide,
//! providing long polling, forum topic management, threaded replies, and
//! media uploads.

pub mod handler;
pub mod media;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, ChatAction, InputFile, Message, MessageId, ReplyParameters, ThreadId,
};
use teloxide::RequestError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use topicbridge_config::model::TelegramConfig;
use topicbridge_core::error::BridgeError;
use topicbridge_core::traits::{PluginAdapter, SecondaryTransport};
use topicbridge_core::types::{
    AdapterType, HealthStatus, MediaUpload, Network, SecondaryEvent, SecondaryMethod,
    SecondaryTarget,
};
use tracing::{debug, info, warn};

/// Applies the topic thread, reply reference and optional caption of a
/// [`SecondaryTarget`] to any teloxide send request.
macro_rules! targeted {
    ($req:expr, $target:expr) => {{
        let mut req = $req;
        if let Some(thread) = $target.thread_id {
            req = req.message_thread_id(thread_id(thread)?);
        }
        if let Some(reply) = $target.reply_to {
            req = req.reply_parameters(ReplyParameters::new(message_id(reply)?));
        }
        req
    }};
    ($req:expr, $target:expr, $caption:expr) => {{
        let mut req = targeted!($req, $target);
        if let Some(caption) = $caption {
            req = req.caption(caption);
        }
        req
    }};
}

/// Telegram forum adapter implementing [`SecondaryTransport`].
///
/// Receives updates via long polling, keeps only messages posted inside
/// topics of the configured forum by authorized members, and forwards them
/// to the bridge as [`SecondaryEvent`]s.
pub struct TelegramTransport {
    bot: Bot,
    config: TelegramConfig,
    forum_chat_id: i64,
    polling_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramTransport {
    /// Creates a new Telegram adapter.
    ///
    /// Requires `config.bot_token` and `config.chat_id` to be set.
    pub fn new(config: TelegramConfig) -> Result<Self, BridgeError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            BridgeError::Config("telegram.bot_token is required for Telegram adapter".into())
        })?;

        if token.is_empty() {
            return Err(BridgeError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }

        let forum_chat_id = config.chat_id.ok_or_else(|| {
            BridgeError::Config("telegram.chat_id must name the forum supergroup".into())
        })?;

        Ok(Self {
            bot: Bot::new(token),
            config,
            forum_chat_id,
            polling_handle: Mutex::new(None),
        })
    }

    /// Returns a reference to the underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Starts long polling and forwards accepted updates to `events`.
    ///
    /// Polling stops when `cancel` fires or on [`PluginAdapter::shutdown`].
    /// Calling `start` twice is a no-op.
    pub fn start(&self, events: mpsc::Sender<SecondaryEvent>, cancel: CancellationToken) {
        let mut slot = match self.polling_handle.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return; // Already polling
        }

        let bot = self.bot.clone();
        let forum = self.forum_chat_id;
        let allowed_users: Arc<Vec<String>> = Arc::new(self.config.allowed_users.clone());
        let message_tx = events.clone();
        let callback_tx = events;

        info!(chat_id = forum, "starting Telegram long polling");

        let handle = tokio::spawn(async move {
            let handler = dptree::entry()
                .branch(Update::filter_message().endpoint(move |msg: Message| {
                    let tx = message_tx.clone();
                    let allowed = allowed_users.clone();
                    async move {
                        if !handler::is_forum_topic_message(&msg, forum) {
                            debug!(chat_id = msg.chat.id.0, "ignoring message outside forum topics");
                            return respond(());
                        }

                        if !handler::is_authorized(&msg, &allowed) {
                            debug!(chat_id = msg.chat.id.0, "ignoring unauthorized user");
                            return respond(());
                        }

                        match handler::to_secondary_message(&msg) {
                            Some(message) => {
                                if tx.send(SecondaryEvent::Message(message)).await.is_err() {
                                    warn!("secondary event channel closed, dropping message");
                                }
                            }
                            None => {
                                debug!(msg_id = msg.id.0, "ignoring unsupported message type");
                            }
                        }

                        respond(())
                    }
                }))
                .branch(Update::filter_callback_query().endpoint(
                    move |bot: Bot, query: CallbackQuery| {
                        let tx = callback_tx.clone();
                        async move {
                            if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
                                debug!(error = %e, "failed to answer callback query");
                            }
                            let callback = handler::to_callback(&query);
                            if callback.chat_id == Some(forum)
                                && tx.send(SecondaryEvent::Callback(callback)).await.is_err()
                            {
                                warn!("secondary event channel closed, dropping callback");
                            }
                            respond(())
                        }
                    },
                ));

            let mut dispatcher = Dispatcher::builder(bot, handler)
                .default_handler(|_| async {}) // Silently ignore other update kinds
                .build();

            tokio::select! {
                _ = dispatcher.dispatch() => {}
                _ = cancel.cancelled() => {
                    debug!("Telegram polling cancelled");
                }
            }
        });

        *slot = Some(handle);
    }
}

#[async_trait]
impl PluginAdapter for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::SecondaryTransport
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        // Check if the bot token is valid by calling getMe.
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        debug!("Telegram transport shutting down");
        let handle = match self.polling_handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl SecondaryTransport for TelegramTransport {
    async fn send_text(&self, target: SecondaryTarget, text: &str) -> Result<i64, BridgeError> {
        let sent = targeted!(self.bot.send_message(ChatId(target.chat_id), text), target)
            .await
            .map_err(|e| request_error("send message", e))?;
        Ok(i64::from(sent.id.0))
    }

    async fn send_media(
        &self,
        target: SecondaryTarget,
        upload: MediaUpload,
    ) -> Result<i64, BridgeError> {
        let chat = ChatId(target.chat_id);
        let file = InputFile::memory(upload.data).file_name(upload.file_name);
        let caption = upload.caption;

        let sent = match upload.method {
            SecondaryMethod::Photo => {
                targeted!(self.bot.send_photo(chat, file), target, caption).await
            }
            SecondaryMethod::Video => {
                targeted!(self.bot.send_video(chat, file), target, caption).await
            }
            SecondaryMethod::Audio => {
                targeted!(self.bot.send_audio(chat, file), target, caption).await
            }
            SecondaryMethod::Voice => {
                targeted!(self.bot.send_voice(chat, file), target, caption).await
            }
            SecondaryMethod::Document => {
                targeted!(self.bot.send_document(chat, file), target, caption).await
            }
            SecondaryMethod::Sticker => targeted!(self.bot.send_sticker(chat, file), target).await,
        }
        .map_err(|e| request_error("send media", e))?;

        Ok(i64::from(sent.id.0))
    }

    async fn create_topic(&self, chat_id: i64, name: &str) -> Result<i64, BridgeError> {
        let topic = self
            .bot
            .create_forum_topic(ChatId(chat_id), name)
            .await
            .map_err(|e| request_error("create forum topic", e))?;
        Ok(i64::from(topic.thread_id.0.0))
    }

    async fn probe_topic(&self, chat_id: i64, thread: i64) -> Result<(), BridgeError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .message_thread_id(thread_id(thread)?)
            .await
            .map_err(|e| request_error("probe topic", e))?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, BridgeError> {
        media::download_file(&self.bot, file_id).await
    }
}

/// Wraps a teloxide error, keeping the Bot API description in the message
/// so missing-topic failures stay recognizable.
fn request_error(action: &str, e: RequestError) -> BridgeError {
    BridgeError::Transport {
        network: Network::Secondary,
        message: format!("failed to {action}: {e}"),
        source: Some(Box::new(e)),
    }
}

fn message_id(id: i64) -> Result<MessageId, BridgeError> {
    i32::try_from(id).map(MessageId).map_err(|_| {
        BridgeError::transport(Network::Secondary, format!("message id {id} out of range"))
    })
}

fn thread_id(id: i64) -> Result<ThreadId, BridgeError> {
    message_id(id).map(ThreadId)
}
