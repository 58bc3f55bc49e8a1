//! Delivery queue processor — the per-item state machine.
//!
//! `pending → processing → sent | failed`. Failed items only come back to
//! life through the retry sweep; the processor itself never resurrects
//! them. The pending→processing transition is a compare-and-set, so a
//! duplicate trigger for the same item loses the claim and walks away.

use std::sync::Arc;

use chrono::Duration;
use futures::StreamExt;
use serde_json::json;

use paddock_core::clock::Clock;
use paddock_core::error::Result;
use paddock_core::model::{collections, DeliveryState, Notification, QueueItem, QueueStatus};
use paddock_core::store::{DocumentStore, FieldFilter};
use paddock_channels::NotificationPayload;

use crate::dispatch::{ChannelDispatcher, DispatchOutcome};
use crate::ratelimit::{Admission, RateLimiter};

/// What happened to one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Sent,
    Failed,
    /// Attempts were already exhausted; item moved straight to failed.
    TerminalFailed,
    /// Not due yet, or rate-limited and rescheduled. No attempt consumed.
    Deferred,
    /// Not pending (already claimed, already terminal, or gone).
    Skipped,
}

/// Aggregate of a `process_due` drain.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessReport {
    pub sent: usize,
    pub failed: usize,
    pub deferred: usize,
    pub skipped: usize,
}

pub struct QueueProcessor {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    limiter: Arc<RateLimiter>,
    dispatcher: ChannelDispatcher,
    concurrency: usize,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        limiter: Arc<RateLimiter>,
        dispatcher: ChannelDispatcher,
        concurrency: usize,
    ) -> Self {
        Self { store, clock, limiter, dispatcher, concurrency: concurrency.max(1) }
    }

    /// Handle one queue item, typically in response to its creation.
    pub async fn process_item(&self, item_id: &str) -> Result<ProcessOutcome> {
        let Some(doc) = self.store.get(collections::NOTIFICATION_QUEUE, item_id).await? else {
            tracing::warn!(item_id = %item_id, "Queue item vanished before processing");
            return Ok(ProcessOutcome::Skipped);
        };
        let item: QueueItem = serde_json::from_value(doc)?;

        // Idempotency guard: duplicate triggers see a non-pending status.
        if item.status != QueueStatus::Pending {
            return Ok(ProcessOutcome::Skipped);
        }

        let now = self.clock.now();

        if item.attempts >= item.max_attempts {
            tracing::warn!(item_id = %item.id, channel = %item.channel, "Attempts exhausted, marking failed");
            self.store
                .update(
                    collections::NOTIFICATION_QUEUE,
                    &item.id,
                    json!({
                        "status": "failed",
                        "last_error": "max delivery attempts exceeded",
                        "updated_at": now,
                    }),
                )
                .await?;
            self.mirror_status(&item, DeliveryState::Failed).await;
            return Ok(ProcessOutcome::TerminalFailed);
        }

        // Scheduled for later — a re-trigger will fire when it is due.
        if item.scheduled_for > now {
            return Ok(ProcessOutcome::Deferred);
        }

        if let Admission::Denied { delay_ms } = self.limiter.try_acquire(item.channel).await {
            // Deferral, not failure: no attempt consumed.
            self.store
                .update(
                    collections::NOTIFICATION_QUEUE,
                    &item.id,
                    json!({
                        "scheduled_for": now + Duration::milliseconds(delay_ms as i64),
                        "last_error": format!("rate limited on {}", item.channel),
                        "updated_at": now,
                    }),
                )
                .await?;
            tracing::debug!(item_id = %item.id, channel = %item.channel, delay_ms, "Rate limited, rescheduled");
            return Ok(ProcessOutcome::Deferred);
        }

        let claimed = self
            .store
            .compare_and_set(
                collections::NOTIFICATION_QUEUE,
                &item.id,
                "status",
                &json!("pending"),
                json!({
                    "status": "processing",
                    "attempts": item.attempts + 1,
                    "updated_at": now,
                }),
            )
            .await?;
        if !claimed {
            return Ok(ProcessOutcome::Skipped);
        }

        let payload = match self.load_payload(&item).await? {
            Some(payload) => payload,
            None => {
                self.finish(&item, QueueStatus::Failed, Some("parent notification missing".into()))
                    .await?;
                return Ok(ProcessOutcome::Failed);
            }
        };

        match self.dispatcher.dispatch(&item, &payload).await {
            DispatchOutcome::Sent => {
                self.finish(&item, QueueStatus::Sent, None).await?;
                self.mirror_status(&item, DeliveryState::Sent).await;
                Ok(ProcessOutcome::Sent)
            }
            DispatchOutcome::Failed { error, pruned_target } => {
                tracing::warn!(
                    item_id = %item.id,
                    channel = %item.channel,
                    pruned_target,
                    "Delivery failed: {error}"
                );
                self.finish(&item, QueueStatus::Failed, Some(error)).await?;
                self.mirror_status(&item, DeliveryState::Failed).await;
                Ok(ProcessOutcome::Failed)
            }
        }
    }

    /// Drain every due pending item, a bounded number at a time. Used by
    /// the cron-driven runner where per-item triggers are unavailable.
    pub async fn process_due(&self) -> Result<ProcessReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let now = self.clock.now();

        let rows = self
            .store
            .query(
                collections::NOTIFICATION_QUEUE,
                &[FieldFilter::eq("status", "pending")],
                None,
                None,
            )
            .await?;

        let due: Vec<String> = rows
            .into_iter()
            .filter_map(|(id, doc)| {
                let scheduled_for = doc.get("scheduled_for")?.as_str()?.parse::<chrono::DateTime<chrono::Utc>>().ok()?;
                (scheduled_for <= now).then_some(id)
            })
            .collect();

        tracing::info!(run_id = %run_id, "📬 Queue drain: {} due item(s)", due.len());

        let outcomes: Vec<ProcessOutcome> = futures::stream::iter(due)
            .map(|id| {
                let run_id = &run_id;
                async move {
                    match self.process_item(&id).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(run_id = %run_id, item_id = %id, "Item processing failed: {e}");
                            ProcessOutcome::Skipped
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = ProcessReport::default();
        for outcome in outcomes {
            match outcome {
                ProcessOutcome::Sent => report.sent += 1,
                ProcessOutcome::Failed | ProcessOutcome::TerminalFailed => report.failed += 1,
                ProcessOutcome::Deferred => report.deferred += 1,
                ProcessOutcome::Skipped => report.skipped += 1,
            }
        }
        tracing::info!(
            run_id = %run_id,
            "✅ Queue drain done: {} sent, {} failed, {} deferred, {} skipped",
            report.sent,
            report.failed,
            report.deferred,
            report.skipped
        );
        Ok(report)
    }

    async fn load_payload(&self, item: &QueueItem) -> Result<Option<NotificationPayload>> {
        let Some(doc) = self.store.get(collections::NOTIFICATIONS, &item.notification_id).await?
        else {
            return Ok(None);
        };
        let notification: Notification = serde_json::from_value(doc)?;
        Ok(Some(NotificationPayload {
            title: notification.title,
            body: notification.body,
            priority: notification.priority,
        }))
    }

    async fn finish(&self, item: &QueueItem, status: QueueStatus, error: Option<String>) -> Result<()> {
        self.store
            .update(
                collections::NOTIFICATION_QUEUE,
                &item.id,
                json!({
                    "status": status,
                    "last_error": error,
                    "updated_at": self.clock.now(),
                }),
            )
            .await
    }

    /// Mirror the terminal state into the parent notification's
    /// `delivery_status` map. Best-effort: a missing parent is logged, not
    /// propagated — the item's own state is already recorded.
    async fn mirror_status(&self, item: &QueueItem, state: DeliveryState) {
        let result = self
            .store
            .update(
                collections::NOTIFICATIONS,
                &item.notification_id,
                json!({ "delivery_status": { (item.channel.as_str()): state } }),
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(
                notification_id = %item.notification_id,
                channel = %item.channel,
                "Could not mirror delivery status: {e}"
            );
        }
    }
}
