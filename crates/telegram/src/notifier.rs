use std::time::Duration;

use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};
use tracing::warn;

use common::{Error, Notifier, Result};

/// Delivers alerts to one Telegram chat or channel.
pub struct TelegramNotifier {
    bot: Bot,
    chat: Recipient,
}

impl TelegramNotifier {
    /// `chat_id` is either a numeric chat id or a `@channel` username.
    pub fn new(token: impl Into<String>, chat_id: &str, timeout: Duration) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Notifier(format!("failed to build Telegram client: {e}")))?;
        Ok(Self {
            bot: Bot::with_client(token, client),
            chat: parse_recipient(chat_id)?,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        self.bot
            .send_message(self.chat.clone(), text)
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(true)
            .await
            .map(|_| ())
            .map_err(|e| Error::Notifier(e.to_string()))
    }
}

/// Fallback used when Telegram credentials are missing: the alert only
/// reaches the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        warn!(message = %text, "Telegram not configured, alert written to log only");
        Ok(())
    }
}

pub fn parse_recipient(chat_id: &str) -> Result<Recipient> {
    let chat_id = chat_id.trim();
    if chat_id.starts_with('@') && chat_id.len() > 1 {
        return Ok(Recipient::ChannelUsername(chat_id.to_string()));
    }
    chat_id
        .parse::<i64>()
        .map(|id| Recipient::Id(ChatId(id)))
        .map_err(|_| {
            Error::Config(format!(
                "TELEGRAM_CHAT_ID must be a numeric id or @channel, got '{chat_id}'"
            ))
        })
}
