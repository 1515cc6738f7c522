// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram channel adapter for the Carbwise dosing assistant.
//!
//! Implements [`ChannelAdapter`] for the Telegram Bot API via teloxide:
//! long polling for messages and inline-keyboard presses, photo download,
//! inline keyboards for menus and MarkdownV2 formatting with a plain-text
//! fallback.

pub mod handler;
pub mod markdown;
pub mod media;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use carbwise_config::model::TelegramConfig;
use carbwise_core::error::CarbwiseError;
use carbwise_core::traits::{ChannelAdapter, PluginAdapter};
use carbwise_core::types::{
    self as core_types, AdapterType, ChannelCapabilities, HealthStatus, InboundMessage, Menu,
    MessageId, OutboundBody, OutboundMessage, RichText,
};
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode, Recipient,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Telegram rejects photo captions longer than this.
const CAPTION_LIMIT: usize = 1024;

/// Telegram channel adapter implementing [`ChannelAdapter`].
///
/// Serves private chats only and drops updates from users outside
/// `allowed_users` (an empty list admits everyone).
pub struct TelegramChannel {
    bot: Bot,
    config: TelegramConfig,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    polling_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TelegramChannel {
    /// Creates a new Telegram channel adapter.
    ///
    /// The token comes from `config.bot_token`, then `TELEGRAM_BOT_TOKEN`.
    pub fn new(config: TelegramConfig) -> Result<Self, CarbwiseError> {
        let token = resolve_token(config.bot_token.as_deref(), TOKEN_ENV).ok_or_else(|| {
            CarbwiseError::Config(format!(
                "telegram.bot_token or {TOKEN_ENV} is required for the Telegram adapter"
            ))
        })?;

        let bot = Bot::new(token);
        let (inbound_tx, inbound_rx) = mpsc::channel(100);

        Ok(Self {
            bot,
            config,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            inbound_tx,
            polling_handle: Mutex::new(None),
        })
    }

    /// Returns a reference to the underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &RichText,
        markdown: bool,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, CarbwiseError> {
        if markdown {
            let mut request = self
                .bot
                .send_message(Recipient::Id(chat_id), markdown::format_for_telegram(text))
                .parse_mode(ParseMode::MarkdownV2);
            if let Some(markup) = markup.clone() {
                request = request.reply_markup(markup);
            }
            match request.await {
                Ok(sent) => return Ok(sent),
                Err(e) => warn!(error = %e, "MarkdownV2 failed, sending as plain text"),
            }
        }

        let mut request = self
            .bot
            .send_message(Recipient::Id(chat_id), text.to_plain_string());
        if let Some(markup) = markup {
            request = request.reply_markup(markup);
        }
        request.await.map_err(|e| CarbwiseError::Channel {
            message: format!("failed to send message: {e}"),
            source: Some(Box::new(e)),
        })
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        data: Vec<u8>,
        caption: &RichText,
        markdown: bool,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, CarbwiseError> {
        let file = InputFile::memory(data);

        // Too long for a caption: the photo goes alone, the text follows with the menu.
        if caption.to_plain_string().chars().count() > CAPTION_LIMIT {
            debug!("caption over Telegram limit, sending it as a separate message");
            let photo = self
                .bot
                .send_photo(Recipient::Id(chat_id), file)
                .await
                .map_err(|e| CarbwiseError::Channel {
                    message: format!("failed to send photo: {e}"),
                    source: Some(Box::new(e)),
                })?;
            self.send_text(chat_id, caption, markdown, markup).await?;
            return Ok(photo);
        }

        if markdown {
            let mut request = self
                .bot
                .send_photo(Recipient::Id(chat_id), file.clone())
                .caption(markdown::format_for_telegram(caption))
                .parse_mode(ParseMode::MarkdownV2);
            if let Some(markup) = markup.clone() {
                request = request.reply_markup(markup);
            }
            match request.await {
                Ok(sent) => return Ok(sent),
                Err(e) => warn!(error = %e, "MarkdownV2 caption failed, sending as plain text"),
            }
        }

        let mut request = self
            .bot
            .send_photo(Recipient::Id(chat_id), file)
            .caption(caption.to_plain_string());
        if let Some(markup) = markup {
            request = request.reply_markup(markup);
        }
        request.await.map_err(|e| CarbwiseError::Channel {
            message: format!("failed to send photo: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

fn resolve_token(config_token: Option<&str>, env_var: &str) -> Option<String> {
    config_token
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok().filter(|t| !t.is_empty()))
}

/// One inline-keyboard row per menu row; button payloads are the actions.
pub fn keyboard(menu: &Menu) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(menu.rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.action.clone()))
            .collect::<Vec<_>>()
    }))
}

fn tg_chat(chat_id: core_types::ChatId) -> ChatId {
    ChatId(chat_id.0)
}

#[async_trait]
impl PluginAdapter for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, CarbwiseError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), CarbwiseError> {
        debug!("Telegram channel shutting down");
        let handle = self
            .polling_handle
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            handle.abort();
            info!("Telegram long polling stopped");
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_photos: true,
            supports_menus: true,
            supports_markdown: true,
            supports_delete: true,
        }
    }

    async fn connect(&mut self) -> Result<(), CarbwiseError> {
        let slot = self.polling_handle.get_mut().map_err(|_| {
            CarbwiseError::Internal("Telegram polling handle lock poisoned".into())
        })?;
        if slot.is_some() {
            return Ok(());
        }

        let bot = self.bot.clone();
        let allowed_users: Arc<Vec<String>> = Arc::new(self.config.allowed_users.clone());
        let message_tx = self.inbound_tx.clone();
        let message_allowed = allowed_users.clone();
        let callback_tx = self.inbound_tx.clone();
        let callback_allowed = allowed_users;

        info!("starting Telegram long polling");

        let handle = tokio::spawn(async move {
            let on_message = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
                let tx = message_tx.clone();
                let allowed = message_allowed.clone();
                async move {
                    if !handler::is_dm(&msg.chat) {
                        debug!(chat_id = msg.chat.id.0, "ignoring non-DM message");
                        return respond(());
                    }
                    let Some(user) = msg.from.as_ref() else {
                        return respond(());
                    };
                    if !handler::is_authorized(user, &allowed) {
                        debug!(user_id = user.id.0, "ignoring unauthorized user");
                        return respond(());
                    }

                    match handler::extract_content(&bot, &msg).await {
                        Ok(Some(content)) => {
                            if let Some(inbound) = handler::to_inbound_message(&msg, content)
                                && tx.send(inbound).await.is_err()
                            {
                                warn!("inbound channel closed, dropping message");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => error!(error = %e, "failed to extract message content"),
                    }
                    respond(())
                }
            });

            let on_callback =
                Update::filter_callback_query().endpoint(move |bot: Bot, query: CallbackQuery| {
                    let tx = callback_tx.clone();
                    let allowed = callback_allowed.clone();
                    async move {
                        // Stop the button spinner whatever happens next.
                        if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
                            debug!(error = %e, "failed to answer callback query");
                        }
                        let in_dm = query
                            .message
                            .as_ref()
                            .is_some_and(|m| handler::is_dm(m.chat()));
                        if !in_dm || !handler::is_authorized(&query.from, &allowed) {
                            debug!(user_id = query.from.id.0, "ignoring callback");
                            return respond(());
                        }
                        if let Some(inbound) = handler::callback_to_inbound(&query)
                            && tx.send(inbound).await.is_err()
                        {
                            warn!("inbound channel closed, dropping callback");
                        }
                        respond(())
                    }
                });

            let updates = dptree::entry().branch(on_message).branch(on_callback);
            Dispatcher::builder(bot, updates)
                .default_handler(|_| async {})
                .build()
                .dispatch()
                .await;
        });

        *slot = Some(handle);
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, CarbwiseError> {
        let chat_id = tg_chat(msg.chat_id);
        let markup = msg.menu.as_ref().map(keyboard);

        let sent = match msg.body {
            OutboundBody::Text(text) => {
                self.send_text(chat_id, &text, msg.markdown, markup).await?
            }
            OutboundBody::Photo { data, caption } => {
                self.send_photo(chat_id, data, &caption, msg.markdown, markup)
                    .await?
            }
        };

        Ok(MessageId(sent.id.0.to_string()))
    }

    async fn delete_message(
        &self,
        chat_id: core_types::ChatId,
        id: &MessageId,
    ) -> Result<(), CarbwiseError> {
        let msg_id = id
            .0
            .parse::<i32>()
            .map(teloxide::types::MessageId)
            .map_err(|e| CarbwiseError::Channel {
                message: format!("invalid message_id: {e}"),
                source: None,
            })?;

        self.bot
            .delete_message(tg_chat(chat_id), msg_id)
            .await
            .map_err(|e| CarbwiseError::Channel {
                message: format!("failed to delete message: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }

    async fn receive(&self) -> Result<InboundMessage, CarbwiseError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or_else(|| CarbwiseError::Channel {
            message: "Telegram inbound channel closed".into(),
            source: None,
        })
    }
}
