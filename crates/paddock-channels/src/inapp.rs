//! In-app channel — a no-op transport.
//!
//! The notification document's existence in the store IS the delivery; the
//! portal reads it directly. This sender only exists so the queue treats
//! all channels uniformly.

use async_trait::async_trait;

use paddock_core::model::Channel;

use crate::{ChannelSender, NotificationPayload, SendError};

#[derive(Debug, Default)]
pub struct InAppSender;

impl InAppSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelSender for InAppSender {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    async fn send(&self, _target: &str, payload: &NotificationPayload) -> Result<(), SendError> {
        tracing::debug!("📊 In-app notification recorded: {}", payload.title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paddock_core::model::NotifyPriority;

    #[tokio::test]
    async fn in_app_always_succeeds() {
        let sender = InAppSender::new();
        let payload = NotificationPayload {
            title: "Farrier booked".into(),
            body: "Tomorrow 09:00".into(),
            priority: NotifyPriority::Normal,
        };
        assert!(sender.send("", &payload).await.is_ok());
    }
}
