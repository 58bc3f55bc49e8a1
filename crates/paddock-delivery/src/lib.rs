//! # Paddock Delivery
//!
//! The notification delivery queue. The reminder scanner (out of tree)
//! writes `Notification` + `QueueItem` documents; this crate consumes them:
//!
//! ```text
//! QueueProcessor (per new item / cron drain)
//!   ├── pending? attempts left? due?
//!   ├── RateLimiter.try_acquire(channel) — deny ⇒ reschedule, no attempt
//!   ├── claim pending → processing (compare-and-set)
//!   ├── ChannelDispatcher → ChannelSender (email/push/telegram/in-app)
//!   │     └── invalid target ⇒ prune from user prefs
//!   └── terminal sent/failed, mirrored onto the notification
//!
//! MaintenanceSweep
//!   ├── hourly: requeue retryable failures, drop exhausted/stale ones
//!   └── daily: purge old terminal items, archive old read notifications
//! ```

pub mod dispatch;
pub mod processor;
pub mod ratelimit;
pub mod sweep;

pub use dispatch::{ChannelDispatcher, DispatchOutcome};
pub use processor::{ProcessOutcome, ProcessReport, QueueProcessor};
pub use ratelimit::{Admission, RateLimiter};
pub use sweep::{CleanupReport, MaintenanceSweep, RetryReport};
