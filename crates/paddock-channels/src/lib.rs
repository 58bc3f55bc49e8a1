//! # Paddock Channels
//!
//! One `ChannelSender` per delivery channel. Senders own their transport
//! and the channel-specific classification of permanently-dead targets
//! (expired push tokens, blocked bots); the delivery queue reacts to that
//! signal by pruning the target from the user's stored preferences.

pub mod email;
pub mod inapp;
pub mod push;
pub mod telegram;

use async_trait::async_trait;
use serde::Serialize;

use paddock_core::model::{Channel, NotifyPriority};

pub use email::EmailSender;
pub use inapp::InAppSender;
pub use push::PushSender;
pub use telegram::TelegramSender;

/// What a channel transport actually delivers.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub priority: NotifyPriority,
}

/// A failed send, with the transport's verdict on the target.
///
/// `invalid_target = true` means the endpoint is permanently undeliverable
/// (not-registered token, blocked bot chat) — retrying the same target will
/// never succeed and the caller should prune it.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SendError {
    pub message: String,
    pub invalid_target: bool,
}

impl SendError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self { message: message.into(), invalid_target: false }
    }

    pub fn invalid_target(message: impl Into<String>) -> Self {
        Self { message: message.into(), invalid_target: true }
    }
}

/// Channel transport contract.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, target: &str, payload: &NotificationPayload) -> Result<(), SendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_error_classification() {
        assert!(!SendError::transport("timeout").invalid_target);
        assert!(SendError::invalid_target("chat not found").invalid_target);
    }
}
