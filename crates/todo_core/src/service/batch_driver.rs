//! Bulk completion driver.
//!
//! # Responsibility
//! - Flip every incomplete item to complete through the installed
//!   `MarkAll` procedure instead of one round trip per item.
//! - Drive the procedure's partial-progress protocol to full drain.
//!
//! # Invariants
//! - Each invocation receives the unprocessed suffix of the original
//!   candidate array, in original order.
//! - A reported count must lie in `0..=submitted`; anything else is a
//!   `BatchError::InvalidCount`.
//! - A count smaller than `submitted` is a continuation signal, not an
//!   error. Only round exhaustion turns it into `BatchError::RoundsExhausted`.
//! - Procedure failures surface as `BatchError::Procedure`; completions
//!   acknowledged earlier stay in the store.

use crate::error::{BatchError, CoreError, CoreResult};
use crate::procedure::registry::ProcedureRegistry;
use crate::procedure::{mark_all_body, MARK_ALL_PROCEDURE_ID};
use crate::repo::item_repo::ItemRepository;
use crate::resolver::ResourceResolver;
use crate::store::StoreError;
use log::{debug, error, info};
use serde_json::Value;
use std::time::Instant;

/// Outcome of one `mark_all_complete` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkAllReport {
    /// Incomplete items found when the run started.
    pub candidates: usize,
    /// Items the procedure reported as completed.
    pub completed: usize,
    /// Procedure invocations issued.
    pub invocations: u32,
}

/// Continuation loop around the `MarkAll` procedure.
pub struct BatchCompletionDriver<'a, R: ItemRepository> {
    resolver: &'a ResourceResolver,
    items: &'a R,
    procedures: &'a ProcedureRegistry,
    max_rounds: u32,
}

impl<'a, R: ItemRepository> BatchCompletionDriver<'a, R> {
    pub fn new(
        resolver: &'a ResourceResolver,
        items: &'a R,
        procedures: &'a ProcedureRegistry,
        max_rounds: u32,
    ) -> Self {
        Self {
            resolver,
            items,
            procedures,
            max_rounds,
        }
    }

    /// Marks every currently incomplete item as complete.
    ///
    /// Returns immediately, without installing the procedure, when nothing
    /// is incomplete. Safe to re-run after any failure.
    pub fn mark_all_complete(&self) -> CoreResult<MarkAllReport> {
        let started_at = Instant::now();
        let candidates = self.items.list_incomplete_documents()?;
        let mut report = MarkAllReport {
            candidates: candidates.len(),
            ..MarkAllReport::default()
        };

        if candidates.is_empty() {
            info!("event=mark_all module=service status=ok candidates=0 invocations=0");
            return Ok(report);
        }

        let procedure = self
            .procedures
            .get_or_install(MARK_ALL_PROCEDURE_ID, &mark_all_body()?)?;
        let mut remaining: Vec<Value> = candidates.into_iter().map(Value::from).collect();

        while !remaining.is_empty() {
            if report.invocations >= self.max_rounds {
                let err = BatchError::RoundsExhausted {
                    rounds: report.invocations,
                    completed: report.completed,
                    remaining: remaining.len(),
                };
                error!(
                    "event=mark_all module=service status=error error_code=rounds_exhausted candidates={} completed={} duration_ms={}",
                    report.candidates,
                    report.completed,
                    started_at.elapsed().as_millis()
                );
                return Err(err.into());
            }

            let submitted = remaining.len();
            report.invocations += 1;
            let response = self
                .resolver
                .store()
                .execute_procedure(&procedure, vec![Value::Array(remaining.clone())])
                .map_err(|err| self.invocation_error(err, &report))?;
            let count = parse_count(&response, submitted)?;

            debug!(
                "event=mark_all_round module=service status=ok round={} submitted={} completed={}",
                report.invocations, submitted, count
            );
            report.completed += count;
            remaining.drain(..count);
        }

        info!(
            "event=mark_all module=service status=ok candidates={} invocations={} duration_ms={}",
            report.candidates,
            report.invocations,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn invocation_error(&self, err: StoreError, report: &MarkAllReport) -> CoreError {
        error!(
            "event=mark_all module=service status=error round={} completed={} error={}",
            report.invocations, report.completed, err
        );
        match err {
            StoreError::Procedure(source) => CoreError::Batch(BatchError::Procedure {
                completed_before: report.completed,
                source,
            }),
            other => CoreError::Connection(other),
        }
    }
}

/// Reads the procedure's completed count, bounded by `submitted`.
fn parse_count(response: &Value, submitted: usize) -> Result<usize, BatchError> {
    response
        .as_u64()
        .and_then(|count| usize::try_from(count).ok())
        .filter(|count| *count <= submitted)
        .ok_or_else(|| BatchError::InvalidCount {
            submitted,
            reported: response.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::parse_count;
    use crate::error::BatchError;
    use serde_json::json;

    #[test]
    fn parse_count_accepts_values_within_submitted() {
        assert_eq!(parse_count(&json!(0), 5).unwrap(), 0);
        assert_eq!(parse_count(&json!(5), 5).unwrap(), 5);
    }

    #[test]
    fn parse_count_rejects_out_of_range_and_non_integers() {
        for response in [json!(6), json!(-1), json!("3"), json!(null), json!(2.5)] {
            let err = parse_count(&response, 5).unwrap_err();
            assert!(matches!(err, BatchError::InvalidCount { submitted: 5, .. }));
        }
    }
}
