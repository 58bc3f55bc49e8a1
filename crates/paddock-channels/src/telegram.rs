//! Telegram channel — message sending via Bot API.

use async_trait::async_trait;
use serde::Deserialize;

use paddock_core::config::TelegramConfig;
use paddock_core::model::{Channel, NotifyPriority};

use crate::{ChannelSender, NotificationPayload, SendError};

/// Bot API error descriptions that mean the chat is gone for good.
const DEAD_CHAT_MARKERS: [&str; 3] = ["chat not found", "bot was blocked", "user is deactivated"];

/// Telegram sender. The target is the chat id.
pub struct TelegramSender {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSender {
    pub fn new(config: TelegramConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.config.bot_token, method)
    }
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    description: Option<String>,
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn send(&self, target: &str, payload: &NotificationPayload) -> Result<(), SendError> {
        let priority_emoji = match payload.priority {
            NotifyPriority::Urgent => "🚨",
            NotifyPriority::High => "⚠️",
            NotifyPriority::Normal => "📢",
            NotifyPriority::Low => "ℹ️",
        };
        let text = format!(
            "{} *{}*\n\n{}",
            priority_emoji,
            escape_markdown(&payload.title),
            escape_markdown(&payload.body)
        );

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": target,
                "text": text,
                "parse_mode": "Markdown"
            }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SendError::transport(format!("Telegram send failed: {e}")))?;

        let body: TelegramApiResponse = resp
            .json()
            .await
            .map_err(|e| SendError::transport(format!("Invalid Telegram response: {e}")))?;

        if body.ok {
            tracing::info!("✅ Telegram notification sent to chat {target}");
            return Ok(());
        }

        let description = body.description.unwrap_or_default();
        if DEAD_CHAT_MARKERS.iter().any(|m| description.to_lowercase().contains(m)) {
            Err(SendError::invalid_target(format!("Telegram chat {target}: {description}")))
        } else {
            Err(SendError::transport(format!("Telegram API error: {description}")))
        }
    }
}

/// Escape Telegram MarkdownV1 special characters.
fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_").replace('*', "\\*").replace('[', "\\[").replace('`', "\\`")
}
