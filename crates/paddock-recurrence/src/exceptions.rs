//! Exception overlay — per-date skip/modify overrides.

use std::collections::HashMap;

use chrono::NaiveDate;

use paddock_core::model::{ExceptionKind, RecurrenceException};

/// What the overlay says about one candidate date.
#[derive(Debug, Clone)]
pub enum Resolution<'a> {
    /// No exception — materialize with the definition defaults.
    Keep,
    /// Drop the date entirely.
    Skip,
    /// Materialize with the exception's overrides applied.
    Modify(&'a RecurrenceException),
}

/// Exceptions for one definition, keyed by date.
#[derive(Debug, Default)]
pub struct ExceptionOverlay {
    by_date: HashMap<NaiveDate, RecurrenceException>,
}

impl ExceptionOverlay {
    /// Build the overlay from the exceptions that fall inside the
    /// generation window; anything outside is irrelevant to this run.
    pub fn new(
        exceptions: Vec<RecurrenceException>,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Self {
        let by_date = exceptions
            .into_iter()
            .filter(|e| e.date >= window_start && e.date <= window_end)
            .map(|e| (e.date, e))
            .collect();
        Self { by_date }
    }

    pub fn resolve(&self, date: NaiveDate) -> Resolution<'_> {
        match self.by_date.get(&date) {
            None => Resolution::Keep,
            Some(e) if e.kind == ExceptionKind::Skip => Resolution::Skip,
            Some(e) => Resolution::Modify(e),
        }
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}
