//! Retry and cleanup sweeps — the queue's periodic reconciliation jobs.
//!
//! Hourly: failed items that still have attempts left and are younger than
//! the retention window go back to pending (which re-triggers the
//! processor); exhausted or stale failures are deleted — their outcome is
//! already mirrored on the parent notification. Daily: terminal queue
//! items past retention are purged and old read notifications move to the
//! archive store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use paddock_core::clock::Clock;
use paddock_core::config::DeliveryConfig;
use paddock_core::error::Result;
use paddock_core::model::{collections, QueueItem};
use paddock_core::store::{DocumentStore, FieldFilter, WriteOp};

/// Provider-imposed write batch ceiling, same as the materializer's.
const BATCH_CEILING: usize = 400;

#[derive(Debug, Default, Clone, Copy)]
pub struct RetryReport {
    pub requeued: usize,
    pub discarded: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupReport {
    pub deleted_queue_items: usize,
    pub archived_notifications: usize,
}

pub struct MaintenanceSweep {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    failed_retention: Duration,
    queue_retention: Duration,
    archive_after: Duration,
}

impl MaintenanceSweep {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: &DeliveryConfig) -> Self {
        Self {
            store,
            clock,
            failed_retention: Duration::hours(config.failed_retention_hours),
            queue_retention: Duration::days(config.queue_retention_days),
            archive_after: Duration::days(config.archive_after_days),
        }
    }

    /// Hourly pass over failed items.
    pub async fn retry_sweep(&self) -> Result<RetryReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let now = self.clock.now();
        let stale_cutoff = now - self.failed_retention;

        let rows = self
            .store
            .query(
                collections::NOTIFICATION_QUEUE,
                &[FieldFilter::eq("status", "failed")],
                None,
                None,
            )
            .await?;

        let mut report = RetryReport::default();
        let mut ops = Vec::new();

        for (id, doc) in rows {
            let item: QueueItem = match serde_json::from_value(doc) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!(run_id = %run_id, item_id = %id, "Unreadable queue item, discarding: {e}");
                    ops.push(WriteOp::delete(collections::NOTIFICATION_QUEUE, &id));
                    report.discarded += 1;
                    continue;
                }
            };

            if item.attempts >= item.max_attempts || item.created_at < stale_cutoff {
                ops.push(WriteOp::delete(collections::NOTIFICATION_QUEUE, &id));
                report.discarded += 1;
            } else {
                ops.push(WriteOp::update(
                    collections::NOTIFICATION_QUEUE,
                    &id,
                    json!({
                        "status": "pending",
                        "scheduled_for": now,
                        "updated_at": now,
                    }),
                ));
                report.requeued += 1;
            }
        }

        self.flush_chunked(ops).await?;
        tracing::info!(
            run_id = %run_id,
            "🔁 Retry sweep: {} requeued, {} discarded",
            report.requeued,
            report.discarded
        );
        Ok(report)
    }

    /// Daily pass: purge terminal queue items, archive old read
    /// notifications.
    pub async fn cleanup_sweep(&self) -> Result<CleanupReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let now = self.clock.now();

        let mut report = CleanupReport::default();
        let mut ops = Vec::new();

        let queue_cutoff = now - self.queue_retention;
        for status in ["sent", "failed"] {
            let rows = self
                .store
                .query(
                    collections::NOTIFICATION_QUEUE,
                    &[FieldFilter::eq("status", status)],
                    None,
                    None,
                )
                .await?;
            for (id, doc) in rows {
                if timestamp_field(&doc, "updated_at").is_none_or(|t| t < queue_cutoff) {
                    ops.push(WriteOp::delete(collections::NOTIFICATION_QUEUE, &id));
                    report.deleted_queue_items += 1;
                }
            }
        }

        let archive_cutoff = now - self.archive_after;
        let read_rows = self
            .store
            .query(collections::NOTIFICATIONS, &[FieldFilter::eq("read", true)], None, None)
            .await?;
        for (id, doc) in read_rows {
            if timestamp_field(&doc, "created_at").is_none_or(|t| t < archive_cutoff) {
                ops.push(WriteOp::put(collections::NOTIFICATIONS_ARCHIVE, &id, doc));
                ops.push(WriteOp::delete(collections::NOTIFICATIONS, &id));
                report.archived_notifications += 1;
            }
        }

        self.flush_chunked(ops).await?;
        tracing::info!(
            run_id = %run_id,
            "🧹 Cleanup sweep: {} queue item(s) purged, {} notification(s) archived",
            report.deleted_queue_items,
            report.archived_notifications
        );
        Ok(report)
    }

    async fn flush_chunked(&self, ops: Vec<WriteOp>) -> Result<()> {
        for chunk in ops.chunks(BATCH_CEILING) {
            self.store.batch_write(chunk.to_vec()).await?;
        }
        Ok(())
    }
}

fn timestamp_field(doc: &serde_json::Value, field: &str) -> Option<DateTime<Utc>> {
    doc.get(field)?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use paddock_core::clock::FixedClock;
    use paddock_core::model::{Channel, Notification, QueueStatus};
    use paddock_store::MemoryStore;

    fn fixed_clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap().and_utc(),
        ))
    }

    fn sweep(store: Arc<MemoryStore>, clock: Arc<FixedClock>) -> MaintenanceSweep {
        MaintenanceSweep::new(store, clock, &DeliveryConfig::default())
    }

    async fn seed_failed(
        store: &MemoryStore,
        id: &str,
        attempts: u32,
        created_at: DateTime<Utc>,
    ) {
        let mut item = QueueItem::new("n1", "u1", Channel::Push, None, 3, created_at);
        item.id = id.into();
        item.status = QueueStatus::Failed;
        item.attempts = attempts;
        store
            .put(collections::NOTIFICATION_QUEUE, id, serde_json::to_value(&item).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn retry_sweep_requeues_young_and_discards_exhausted_or_stale() {
        let store = Arc::new(MemoryStore::new());
        let clock = fixed_clock();
        let now = clock.now();

        seed_failed(&store, "retryable", 1, now - Duration::hours(2)).await;
        seed_failed(&store, "exhausted", 3, now - Duration::hours(2)).await;
        seed_failed(&store, "stale", 1, now - Duration::hours(30)).await;

        let report = sweep(store.clone(), clock).retry_sweep().await.unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(report.discarded, 2);

        let doc = store.get(collections::NOTIFICATION_QUEUE, "retryable").await.unwrap().unwrap();
        assert_eq!(doc["status"], "pending");
        assert!(store.get(collections::NOTIFICATION_QUEUE, "exhausted").await.unwrap().is_none());
        assert!(store.get(collections::NOTIFICATION_QUEUE, "stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_purges_old_terminal_items_only() {
        let store = Arc::new(MemoryStore::new());
        let clock = fixed_clock();
        let now = clock.now();

        let mut old_sent = QueueItem::new("n1", "u1", Channel::Push, None, 3, now - Duration::days(10));
        old_sent.id = "old-sent".into();
        old_sent.status = QueueStatus::Sent;
        old_sent.updated_at = now - Duration::days(10);
        let mut fresh_sent = QueueItem::new("n1", "u1", Channel::Push, None, 3, now);
        fresh_sent.id = "fresh-sent".into();
        fresh_sent.status = QueueStatus::Sent;
        let mut pending = QueueItem::new("n1", "u1", Channel::Push, None, 3, now - Duration::days(10));
        pending.id = "old-pending".into();
        pending.updated_at = now - Duration::days(10);
        for item in [&old_sent, &fresh_sent, &pending] {
            store
                .put(collections::NOTIFICATION_QUEUE, &item.id, serde_json::to_value(item).unwrap())
                .await
                .unwrap();
        }

        let report = sweep(store.clone(), clock).cleanup_sweep().await.unwrap();
        assert_eq!(report.deleted_queue_items, 1);
        assert!(store.get(collections::NOTIFICATION_QUEUE, "old-sent").await.unwrap().is_none());
        assert!(store.get(collections::NOTIFICATION_QUEUE, "fresh-sent").await.unwrap().is_some());
        // pending items are never purged, however old
        assert!(store.get(collections::NOTIFICATION_QUEUE, "old-pending").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cleanup_archives_old_read_notifications() {
        let store = Arc::new(MemoryStore::new());
        let clock = fixed_clock();
        let now = clock.now();

        let mut old_read = Notification::new("t1", "u1", "Old news", "...", now - Duration::days(45));
        old_read.id = "old-read".into();
        old_read.read = true;
        let mut fresh_read = Notification::new("t1", "u1", "Fresh news", "...", now - Duration::days(2));
        fresh_read.id = "fresh-read".into();
        fresh_read.read = true;
        let mut old_unread = Notification::new("t1", "u1", "Unread", "...", now - Duration::days(45));
        old_unread.id = "old-unread".into();
        for n in [&old_read, &fresh_read, &old_unread] {
            store
                .put(collections::NOTIFICATIONS, &n.id, serde_json::to_value(n).unwrap())
                .await
                .unwrap();
        }

        let report = sweep(store.clone(), clock).cleanup_sweep().await.unwrap();
        assert_eq!(report.archived_notifications, 1);
        assert!(store.get(collections::NOTIFICATIONS, "old-read").await.unwrap().is_none());
        assert!(store.get(collections::NOTIFICATIONS_ARCHIVE, "old-read").await.unwrap().is_some());
        // unread or fresh notifications stay put
        assert!(store.get(collections::NOTIFICATIONS, "fresh-read").await.unwrap().is_some());
        assert!(store.get(collections::NOTIFICATIONS, "old-unread").await.unwrap().is_some());
    }
}
