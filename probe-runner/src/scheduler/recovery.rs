//! Startup recovery
//!
//! The job queue lives in memory, so jobs that were queued or running when the
//! previous process stopped will never be picked up again. They are failed
//! before the scheduler starts, each with a report for the lost attempt.

use probe_core::domain::outcome::ExecutionOutcome;
use probe_core::domain::task::StateUpdate;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::scheduler::worker::empty_payload;
use crate::service::ReportWriter;
use crate::store::{DefinitionStore, ReportStore, StateStore};

pub const INTERRUPTED_MESSAGE: &str = "interrupted by scheduler restart";

/// Fails every unfinished job left behind by a previous run
///
/// Must run before the scheduler accepts submissions, otherwise fresh jobs
/// would be failed too.
///
/// # Returns
/// Number of jobs marked as FAILURE
pub async fn fail_interrupted_jobs(
    definitions: &dyn DefinitionStore,
    states: &dyn StateStore,
    reports: Arc<dyn ReportStore>,
) -> Result<usize, StoreError> {
    let unfinished = states.list_unfinished().await?;
    if unfinished.is_empty() {
        return Ok(0);
    }

    let writer = ReportWriter::new(reports);
    let mut failed = 0;

    for record in unfinished {
        let handle = record.handle;
        let definition = definitions
            .get_definition(record.kind, record.definition_id)
            .await?;

        let outcome = definition.as_ref().map(|definition| {
            ExecutionOutcome::failed(0.0, empty_payload(definition), INTERRUPTED_MESSAGE)
        });

        let update = StateUpdate::Failed {
            error: INTERRUPTED_MESSAGE.to_string(),
            outcome: outcome.clone(),
        };
        match states.apply(handle, update).await {
            Ok(_) => failed += 1,
            Err(StoreError::InvalidTransition(e)) => {
                warn!("Job {} finished during recovery: {}", handle, e);
                continue;
            }
            Err(e) => return Err(e),
        }

        match (definition, outcome) {
            (Some(definition), Some(outcome)) => {
                let start_time = record.started_at.unwrap_or(record.submitted_at);
                writer.write(handle, &definition, &outcome, start_time).await;
            }
            _ => warn!(
                "{} definition {} of job {} is gone, no report written",
                record.kind, record.definition_id, handle
            ),
        }
    }

    info!("Failed {} job(s) interrupted by the previous shutdown", failed);
    Ok(failed)
}
