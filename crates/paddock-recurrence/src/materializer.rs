//! Instance materializer — the daily sweep over active definitions.
//!
//! Definitions are independent, so they run through a bounded worker pool;
//! work inside one definition stays strictly sequential and dates are
//! written in ascending order, so a failed batch leaves a clean prefix
//! committed. A definition failure is logged and isolated — only a failure
//! to list the definitions at all fails the sweep.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use futures::StreamExt;
use serde_json::Value;

use paddock_core::clock::Clock;
use paddock_core::config::MaterializerConfig;
use paddock_core::error::{PaddockError, Result};
use paddock_core::model::{
    collections, ActivityInstance, AssignmentMode, RecurrenceException, RecurringDefinition,
};
use paddock_core::store::{DocumentStore, FieldFilter, WriteOp};

use crate::assignment::{resolve_assignee, RotationCursor};
use crate::exceptions::{ExceptionOverlay, Resolution};
use crate::expand::expand_dates;
use crate::holidays::{effective_weight, is_holiday_shift};
use crate::rrule::parse_rule;

/// Aggregate result of one sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaterializeReport {
    pub definitions: usize,
    pub failed_definitions: usize,
    pub created: usize,
    pub skipped_existing: usize,
    pub skipped_exception: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct DefinitionOutcome {
    created: usize,
    skipped_existing: usize,
    skipped_exception: usize,
}

pub struct Materializer {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    concurrency: usize,
}

impl Materializer {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: &MaterializerConfig) -> Self {
        Self {
            store,
            clock,
            batch_size: config.batch_size.max(1),
            concurrency: config.worker_concurrency.max(1),
        }
    }

    /// Run one sweep over all active definitions.
    pub async fn run(&self) -> Result<MaterializeReport> {
        let run_id = uuid::Uuid::new_v4().to_string();

        // The one call whose failure fails the whole job.
        let rows = self
            .store
            .query(
                collections::RECURRING_DEFINITIONS,
                &[FieldFilter::eq("status", "active")],
                None,
                None,
            )
            .await?;

        tracing::info!(run_id = %run_id, "⏰ Materialization sweep: {} active definition(s)", rows.len());

        let mut report = MaterializeReport { definitions: rows.len(), ..Default::default() };

        let outcomes: Vec<Option<DefinitionOutcome>> = futures::stream::iter(rows)
            .map(|(id, doc)| {
                let run_id = &run_id;
                async move {
                    match self.materialize_definition(run_id, &id, doc).await {
                        Ok(outcome) => Some(outcome),
                        Err(e) => {
                            tracing::error!(run_id = %run_id, definition_id = %id, "Definition failed: {e}");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Some(o) => {
                    report.created += o.created;
                    report.skipped_existing += o.skipped_existing;
                    report.skipped_exception += o.skipped_exception;
                }
                None => report.failed_definitions += 1,
            }
        }

        tracing::info!(
            run_id = %run_id,
            "✅ Sweep done: {} created, {} already existed, {} skipped by exception, {} definition(s) failed",
            report.created,
            report.skipped_existing,
            report.skipped_exception,
            report.failed_definitions
        );
        Ok(report)
    }

    async fn materialize_definition(
        &self,
        run_id: &str,
        doc_id: &str,
        doc: Value,
    ) -> Result<DefinitionOutcome> {
        let def: RecurringDefinition = serde_json::from_value(doc)?;

        let today = self.clock.today();
        // N days of coverage starting today; N = 0 generates nothing.
        if def.generate_days_ahead == 0 {
            return Ok(DefinitionOutcome::default());
        }
        let window_end = today + Duration::days(i64::from(def.generate_days_ahead) - 1);

        let rule = parse_rule(&def.rule);
        let dates = expand_dates(&rule, today, window_end, def.pattern_start, def.pattern_end);
        if dates.is_empty() {
            return Ok(DefinitionOutcome::default());
        }

        // Everything shared by the whole window is fetched once up front —
        // exceptions and already-materialized dates — never per date.
        let overlay = self.load_exceptions(&def.id, today, window_end).await?;
        let existing = self.load_existing_dates(&def.id, today, window_end).await?;

        let mut rotation = RotationCursor::new(&def);
        let mut outcome = DefinitionOutcome::default();
        let mut batch: Vec<WriteOp> = Vec::new();

        for date in dates {
            if existing.contains(&date) {
                outcome.skipped_existing += 1;
                continue;
            }

            let exception = match overlay.resolve(date) {
                Resolution::Skip => {
                    outcome.skipped_exception += 1;
                    continue;
                }
                Resolution::Keep => None,
                Resolution::Modify(exc) => Some(exc),
            };
            let instance = self.build_instance(&def, &mut rotation, date, exception);

            batch.push(WriteOp::put(
                collections::ACTIVITY_INSTANCES,
                &instance.id,
                serde_json::to_value(&instance)?,
            ));
            outcome.created += 1;

            if batch.len() >= self.batch_size {
                self.flush(&def.id, &mut batch).await?;
            }
        }
        self.flush(&def.id, &mut batch).await?;

        // Bookkeeping goes out in one write so the rotation cursor and the
        // generation watermark can never diverge.
        let mut patch = serde_json::json!({ "last_generated_date": window_end });
        if def.assignment == AssignmentMode::Rotation {
            patch["current_rotation_index"] = rotation.index().into();
        }
        self.store.update(collections::RECURRING_DEFINITIONS, doc_id, patch).await?;

        tracing::debug!(
            run_id = %run_id,
            definition_id = %def.id,
            "Materialized {} instance(s), {} existed, {} skipped",
            outcome.created,
            outcome.skipped_existing,
            outcome.skipped_exception
        );
        Ok(outcome)
    }

    async fn flush(&self, definition_id: &str, batch: &mut Vec<WriteOp>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = std::mem::take(batch);
        self.store
            .batch_write(ops)
            .await
            .map_err(|e| PaddockError::BatchWrite(format!("definition {definition_id}: {e}")))
    }

    async fn load_exceptions(
        &self,
        definition_id: &str,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<ExceptionOverlay> {
        let rows = self
            .store
            .query(
                collections::RECURRENCE_EXCEPTIONS,
                &[FieldFilter::eq("definition_id", definition_id)],
                None,
                None,
            )
            .await?;
        let mut exceptions = Vec::with_capacity(rows.len());
        for (id, doc) in rows {
            match serde_json::from_value::<RecurrenceException>(doc) {
                Ok(exc) => exceptions.push(exc),
                Err(e) => tracing::warn!(exception_id = %id, "Skipping unreadable exception: {e}"),
            }
        }
        Ok(ExceptionOverlay::new(exceptions, window_start, window_end))
    }

    async fn load_existing_dates(
        &self,
        definition_id: &str,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<HashSet<NaiveDate>> {
        let rows = self
            .store
            .query(
                collections::ACTIVITY_INSTANCES,
                &[
                    FieldFilter::eq("recurring_definition_id", definition_id),
                    FieldFilter::ge("scheduled_date", window_start.to_string()),
                    FieldFilter::le("scheduled_date", window_end.to_string()),
                ],
                None,
                None,
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, doc)| {
                doc.get("scheduled_date")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<NaiveDate>().ok())
            })
            .collect())
    }

    fn build_instance(
        &self,
        def: &RecurringDefinition,
        rotation: &mut RotationCursor,
        date: NaiveDate,
        exception: Option<&RecurrenceException>,
    ) -> ActivityInstance {
        let override_assignee = exception.and_then(|e| e.override_assignee.as_ref());
        let assigned_to = resolve_assignee(def, rotation, override_assignee);
        let title = exception
            .and_then(|e| e.override_title.clone())
            .unwrap_or_else(|| def.title.clone());
        let scheduled_time = exception
            .and_then(|e| e.override_time.clone())
            .unwrap_or_else(|| def.scheduled_time.clone());

        ActivityInstance {
            id: ActivityInstance::doc_id(&def.id, date),
            recurring_definition_id: def.id.clone(),
            tenant_id: def.tenant_id.clone(),
            title,
            scheduled_date: date,
            scheduled_time,
            duration_minutes: def.duration_minutes,
            assigned_to,
            weight: effective_weight(def.base_weight, def.holiday_weight_multiplier, date),
            is_holiday_shift: is_holiday_shift(date),
            is_exception: exception.is_some(),
            status: "scheduled".into(),
        }
    }
}
