//! Document model — everything the two engines read or write.
//!
//! Documents live in the `DocumentStore` as JSON; the structs here are the
//! typed view both engines share. Collection names are constants so the
//! producer (CRUD layer, reminder scanner) and the consumers agree on the
//! contract without a direct code dependency.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Store collection names.
pub mod collections {
    pub const RECURRING_DEFINITIONS: &str = "recurring_definitions";
    pub const RECURRENCE_EXCEPTIONS: &str = "recurrence_exceptions";
    pub const ACTIVITY_INSTANCES: &str = "activity_instances";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const NOTIFICATION_QUEUE: &str = "notification_queue";
    pub const USER_PREFS: &str = "user_prefs";
    pub const NOTIFICATIONS_ARCHIVE: &str = "notifications_archive";
}

/// Delivery channel for a queued notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Push,
    Telegram,
    InApp,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Email, Channel::Push, Channel::Telegram, Channel::InApp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Push => "push",
            Channel::Telegram => "telegram",
            Channel::InApp => "in_app",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for NotifyPriority {
    fn default() -> Self {
        NotifyPriority::Normal
    }
}

/// How a generated instance gets its responsible person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    /// Always the definition's configured assignee.
    Fixed,
    /// Cycle through `rotation_group`, cursor persisted on the definition.
    Rotation,
    /// Left unassigned here; a separate allocator fills these in later.
    FairDistribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    Active,
    Paused,
}

/// A tenant-scoped recurring-activity template.
///
/// The materializer only ever writes back `current_rotation_index` and
/// `last_generated_date` (together, once per run); every other field is
/// owned by the CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringDefinition {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    /// Compact recurrence rule, e.g. `FREQ=WEEKLY;BYDAY=MO,WE,FR`.
    pub rule: String,
    pub pattern_start: NaiveDate,
    #[serde(default)]
    pub pattern_end: Option<NaiveDate>,
    #[serde(default = "default_days_ahead")]
    pub generate_days_ahead: u32,
    /// Time of day, `HH:MM`.
    pub scheduled_time: String,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    pub assignment: AssignmentMode,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub rotation_group: Vec<String>,
    #[serde(default)]
    pub current_rotation_index: usize,
    #[serde(default)]
    pub holiday_weight_multiplier: bool,
    #[serde(default = "default_weight")]
    pub base_weight: f64,
    pub status: DefinitionStatus,
    #[serde(default)]
    pub last_generated_date: Option<NaiveDate>,
}

fn default_days_ahead() -> u32 {
    14
}
fn default_duration() -> u32 {
    60
}
fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    Skip,
    Modify,
}

/// Per-date override for a recurring definition. Read-only to the engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceException {
    pub id: String,
    pub definition_id: String,
    pub date: NaiveDate,
    pub kind: ExceptionKind,
    #[serde(default)]
    pub override_title: Option<String>,
    #[serde(default)]
    pub override_time: Option<String>,
    #[serde(default)]
    pub override_assignee: Option<String>,
}

impl RecurrenceException {
    /// Exceptions are keyed `(definition, date)` so at most one exists per day.
    pub fn doc_id(definition_id: &str, date: NaiveDate) -> String {
        format!("{definition_id}_{date}")
    }
}

/// One concrete dated occurrence of a recurring definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityInstance {
    pub id: String,
    pub recurring_definition_id: String,
    pub tenant_id: String,
    pub title: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub weight: f64,
    pub is_holiday_shift: bool,
    pub is_exception: bool,
    pub status: String,
}

impl ActivityInstance {
    /// Composite id doubling as the per-day idempotency key.
    pub fn doc_id(definition_id: &str, date: NaiveDate) -> String {
        format!("{definition_id}_{date}")
    }
}

/// Per-channel delivery state mirrored onto the parent notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Sent,
    Failed,
}

/// A logical notification. Fans out into one `QueueItem` per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub priority: NotifyPriority,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub delivery_status: HashMap<String, DeliveryState>,
}

impl Notification {
    pub fn new(tenant_id: &str, user_id: &str, title: &str, body: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            priority: NotifyPriority::Normal,
            created_at: now,
            read: false,
            delivery_status: HashMap::new(),
        }
    }
}

/// Queue item lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

/// One channel-specific delivery attempt stream for a notification.
///
/// The target is denormalized at enqueue time so retries never re-resolve
/// user preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub notification_id: String,
    pub user_id: String,
    pub channel: Channel,
    #[serde(default)]
    pub target: Option<String>,
    pub status: QueueStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(
        notification_id: &str,
        user_id: &str,
        channel: Channel,
        target: Option<String>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            notification_id: notification_id.to_string(),
            user_id: user_id.to_string(),
            channel,
            target,
            status: QueueStatus::Pending,
            attempts: 0,
            max_attempts,
            scheduled_for: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Delivery endpoints stored per user. The dispatcher prunes entries the
/// transports report as permanently undeliverable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPrefs {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub push_tokens: Vec<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default)]
    pub enabled_channels: Vec<Channel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Channel::InApp).unwrap(), "\"in_app\"");
        let c: Channel = serde_json::from_str("\"telegram\"").unwrap();
        assert_eq!(c, Channel::Telegram);
    }

    #[test]
    fn instance_doc_id_is_definition_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(ActivityInstance::doc_id("def-1", date), "def-1_2024-03-05");
    }

    #[test]
    fn definition_defaults_fill_in() {
        let def: RecurringDefinition = serde_json::from_value(serde_json::json!({
            "id": "d1",
            "tenant_id": "t1",
            "title": "Morning feed",
            "rule": "FREQ=DAILY",
            "pattern_start": "2024-01-01",
            "scheduled_time": "07:00",
            "assignment": "fixed",
            "status": "active",
        }))
        .unwrap();
        assert_eq!(def.generate_days_ahead, 14);
        assert_eq!(def.base_weight, 1.0);
        assert!(def.last_generated_date.is_none());
    }
}
