//! Channel dispatcher — routes a queue item to its channel transport.
//!
//! Resolves the delivery target (denormalized on the item, or one lookup
//! of the user's stored preferences), invokes the sender under a hard
//! timeout, and prunes targets the transport reports as permanently dead
//! so future deliveries stop tripping over them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use paddock_core::error::Result;
use paddock_core::model::{collections, Channel, QueueItem, UserPrefs};
use paddock_core::store::DocumentStore;
use paddock_channels::{ChannelSender, NotificationPayload};

/// Terminal verdict for one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed {
        error: String,
        /// The failing target was removed from the user's preferences.
        pruned_target: bool,
    },
}

pub struct ChannelDispatcher {
    store: Arc<dyn DocumentStore>,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    send_timeout: Duration,
}

impl ChannelDispatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        senders: HashMap<Channel, Arc<dyn ChannelSender>>,
        send_timeout: Duration,
    ) -> Self {
        Self { store, senders, send_timeout }
    }

    pub async fn dispatch(&self, item: &QueueItem, payload: &NotificationPayload) -> DispatchOutcome {
        // In-app delivery is the notification document itself.
        let target = if item.channel == Channel::InApp {
            String::new()
        } else {
            match self.resolve_target(item).await {
                Some(target) => target,
                None => {
                    return DispatchOutcome::Failed {
                        error: format!("no {} target for user {}", item.channel, item.user_id),
                        pruned_target: false,
                    };
                }
            }
        };

        let Some(sender) = self.senders.get(&item.channel) else {
            return DispatchOutcome::Failed {
                error: format!("no sender configured for channel {}", item.channel),
                pruned_target: false,
            };
        };

        match tokio::time::timeout(self.send_timeout, sender.send(&target, payload)).await {
            Ok(Ok(())) => DispatchOutcome::Sent,
            Ok(Err(e)) if e.invalid_target => {
                if let Err(prune_err) = self.prune_target(&item.user_id, item.channel, &target).await
                {
                    tracing::warn!(user_id = %item.user_id, "Failed to prune dead target: {prune_err}");
                }
                DispatchOutcome::Failed { error: e.to_string(), pruned_target: true }
            }
            Ok(Err(e)) => DispatchOutcome::Failed { error: e.to_string(), pruned_target: false },
            Err(_) => DispatchOutcome::Failed {
                error: format!("send timed out after {}s", self.send_timeout.as_secs()),
                pruned_target: false,
            },
        }
    }

    /// Denormalized target on the item wins; otherwise one preferences
    /// lookup — never one per retry.
    async fn resolve_target(&self, item: &QueueItem) -> Option<String> {
        if let Some(target) = item.target.as_ref().filter(|t| !t.is_empty()) {
            return Some(target.clone());
        }
        let prefs = self.load_prefs(&item.user_id).await?;
        match item.channel {
            Channel::Email => prefs.email,
            Channel::Push => prefs.push_tokens.into_iter().next(),
            Channel::Telegram => prefs.telegram_chat_id,
            Channel::InApp => Some(String::new()),
        }
    }

    async fn load_prefs(&self, user_id: &str) -> Option<UserPrefs> {
        match self.store.get(collections::USER_PREFS, user_id).await {
            Ok(Some(doc)) => serde_json::from_value(doc)
                .map_err(|e| tracing::warn!(user_id = %user_id, "Unreadable user prefs: {e}"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(user_id = %user_id, "Prefs lookup failed: {e}");
                None
            }
        }
    }

    /// Remove exactly the failing endpoint, leaving all others intact.
    async fn prune_target(&self, user_id: &str, channel: Channel, target: &str) -> Result<()> {
        let Some(mut prefs) = self.load_prefs(user_id).await else {
            return Ok(());
        };
        let patch = match channel {
            Channel::Push => {
                prefs.push_tokens.retain(|t| t != target);
                serde_json::json!({ "push_tokens": prefs.push_tokens })
            }
            Channel::Telegram if prefs.telegram_chat_id.as_deref() == Some(target) => {
                serde_json::json!({ "telegram_chat_id": null })
            }
            Channel::Email if prefs.email.as_deref() == Some(target) => {
                serde_json::json!({ "email": null })
            }
            _ => return Ok(()),
        };
        tracing::info!(user_id = %user_id, channel = %channel, "Pruning dead delivery target");
        self.store.update(collections::USER_PREFS, user_id, patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use paddock_channels::SendError;
    use paddock_core::model::NotifyPriority;
    use paddock_store::MemoryStore;
    use serde_json::json;

    struct StubSender {
        channel: Channel,
        result: fn() -> std::result::Result<(), SendError>,
    }

    #[async_trait]
    impl ChannelSender for StubSender {
        fn channel(&self) -> Channel {
            self.channel
        }
        async fn send(&self, _target: &str, _payload: &NotificationPayload) -> std::result::Result<(), SendError> {
            (self.result)()
        }
    }

    struct SlowSender;

    #[async_trait]
    impl ChannelSender for SlowSender {
        fn channel(&self) -> Channel {
            Channel::Push
        }
        async fn send(&self, _target: &str, _payload: &NotificationPayload) -> std::result::Result<(), SendError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn payload() -> NotificationPayload {
        NotificationPayload {
            title: "Feed due".into(),
            body: "Evening round".into(),
            priority: NotifyPriority::Normal,
        }
    }

    fn item(channel: Channel, target: Option<&str>) -> QueueItem {
        QueueItem::new("n1", "u1", channel, target.map(String::from), 5, Utc::now())
    }

    fn dispatcher(store: Arc<MemoryStore>, sender: Arc<dyn ChannelSender>) -> ChannelDispatcher {
        let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
        senders.insert(sender.channel(), sender);
        ChannelDispatcher::new(store, senders, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn invalid_target_prunes_only_the_failing_token() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(
                collections::USER_PREFS,
                "u1",
                json!({
                    "user_id": "u1",
                    "email": "rider@example.com",
                    "push_tokens": ["dead-token", "live-token"],
                    "telegram_chat_id": "42"
                }),
            )
            .await
            .unwrap();

        let sender = Arc::new(StubSender {
            channel: Channel::Push,
            result: || Err(SendError::invalid_target("NotRegistered")),
        });
        let dispatcher = dispatcher(store.clone(), sender);

        let outcome = dispatcher.dispatch(&item(Channel::Push, Some("dead-token")), &payload()).await;
        assert!(matches!(outcome, DispatchOutcome::Failed { pruned_target: true, .. }));

        let prefs = store.get(collections::USER_PREFS, "u1").await.unwrap().unwrap();
        assert_eq!(prefs["push_tokens"], json!(["live-token"]));
        // other channels untouched
        assert_eq!(prefs["email"], "rider@example.com");
        assert_eq!(prefs["telegram_chat_id"], "42");
    }

    #[tokio::test]
    async fn transport_error_does_not_prune() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(collections::USER_PREFS, "u1", json!({"user_id": "u1", "push_tokens": ["t1"]}))
            .await
            .unwrap();
        let sender = Arc::new(StubSender {
            channel: Channel::Push,
            result: || Err(SendError::transport("gateway 503")),
        });
        let dispatcher = dispatcher(store.clone(), sender);

        let outcome = dispatcher.dispatch(&item(Channel::Push, Some("t1")), &payload()).await;
        assert!(matches!(outcome, DispatchOutcome::Failed { pruned_target: false, .. }));
        let prefs = store.get(collections::USER_PREFS, "u1").await.unwrap().unwrap();
        assert_eq!(prefs["push_tokens"], json!(["t1"]));
    }

    #[tokio::test]
    async fn target_falls_back_to_prefs_when_not_denormalized() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(
                collections::USER_PREFS,
                "u1",
                json!({"user_id": "u1", "telegram_chat_id": "4242"}),
            )
            .await
            .unwrap();
        let sender =
            Arc::new(StubSender { channel: Channel::Telegram, result: || Ok(()) });
        let dispatcher = dispatcher(store.clone(), sender);

        let outcome = dispatcher.dispatch(&item(Channel::Telegram, None), &payload()).await;
        assert_eq!(outcome, DispatchOutcome::Sent);
    }

    #[tokio::test]
    async fn missing_target_fails_without_send() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(StubSender { channel: Channel::Telegram, result: || Ok(()) });
        let dispatcher = dispatcher(store.clone(), sender);

        let outcome = dispatcher.dispatch(&item(Channel::Telegram, None), &payload()).await;
        assert!(matches!(outcome, DispatchOutcome::Failed { pruned_target: false, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_sender_times_out() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(store, Arc::new(SlowSender));

        let outcome = dispatcher.dispatch(&item(Channel::Push, Some("t1")), &payload()).await;
        let DispatchOutcome::Failed { error, pruned_target } = outcome else {
            panic!("stuck send must fail");
        };
        assert!(error.contains("timed out"));
        assert!(!pruned_target);
    }
}
