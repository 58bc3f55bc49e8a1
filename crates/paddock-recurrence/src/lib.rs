//! # Paddock Recurrence
//!
//! The materialization engine: expands recurring-activity definitions into
//! concrete dated `ActivityInstance` documents.
//!
//! ```text
//! Materializer (daily sweep)
//!   ├── parse rule        "FREQ=WEEKLY;BYDAY=MO,WE,FR"
//!   ├── expand dates      window [today, today + generate_days_ahead]
//!   ├── overlay exceptions  skip / modify per date
//!   ├── resolve assignee  fixed | rotation cursor | deferred
//!   └── batch-write instances, skipping dates that already exist
//! ```
//!
//! Re-running the sweep on the same day creates nothing new; each
//! definition fails in isolation.

pub mod assignment;
pub mod exceptions;
pub mod expand;
pub mod holidays;
pub mod materializer;
pub mod rrule;

pub use assignment::RotationCursor;
pub use exceptions::{ExceptionOverlay, Resolution};
pub use expand::expand_dates;
pub use materializer::{MaterializeReport, Materializer};
pub use rrule::{parse_rule, Frequency, RecurrenceRule};
