//! Push channel — HTTP gateway in the FCM legacy style.
//!
//! The gateway takes a device token plus title/body and answers with a
//! per-message result. `NotRegistered` / `InvalidRegistration` mean the
//! token will never work again and must be pruned upstream.

use async_trait::async_trait;
use serde::Deserialize;

use paddock_core::config::PushConfig;
use paddock_core::model::Channel;

use crate::{ChannelSender, NotificationPayload, SendError};

const DEAD_TOKEN_ERRORS: [&str; 2] = ["NotRegistered", "InvalidRegistration"];

/// Push gateway sender. The target is the device token.
pub struct PushSender {
    config: PushConfig,
    client: reqwest::Client,
}

impl PushSender {
    pub fn new(config: PushConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }
}

#[derive(Debug, Deserialize)]
struct PushApiResponse {
    ok: bool,
    error: Option<String>,
}

#[async_trait]
impl ChannelSender for PushSender {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, target: &str, payload: &NotificationPayload) -> Result<(), SendError> {
        let resp = self
            .client
            .post(&self.config.gateway_url)
            .header("Authorization", format!("key={}", self.config.server_key))
            .json(&serde_json::json!({
                "to": target,
                "notification": {
                    "title": payload.title,
                    "body": payload.body,
                },
                "priority": payload.priority,
            }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SendError::transport(format!("Push send failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SendError::transport(format!("Push gateway error {status}: {body}")));
        }

        let body: PushApiResponse = resp
            .json()
            .await
            .map_err(|e| SendError::transport(format!("Invalid push response: {e}")))?;

        if body.ok {
            tracing::info!("✅ Push notification sent");
            return Ok(());
        }

        let error = body.error.unwrap_or_default();
        if DEAD_TOKEN_ERRORS.contains(&error.as_str()) {
            Err(SendError::invalid_target(format!("Push token dead: {error}")))
        } else {
            Err(SendError::transport(format!("Push gateway rejected: {error}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_token_errors_match_gateway_codes() {
        assert!(DEAD_TOKEN_ERRORS.contains(&"NotRegistered"));
        assert!(!DEAD_TOKEN_ERRORS.contains(&"Unavailable"));
    }
}
