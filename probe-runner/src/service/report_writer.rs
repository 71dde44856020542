//! Report writer service
//!
//! Turns a finished execution into a durable test report. Writing is best
//! effort: failures are logged and never change the job's terminal state.

use chrono::{DateTime, Utc};
use probe_core::domain::definition::JobDefinition;
use probe_core::domain::job::JobHandle;
use probe_core::domain::outcome::ExecutionOutcome;
use probe_core::domain::report::{NewTestReport, TestReport};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::store::ReportStore;

/// Persists one test report per execution attempt
#[derive(Clone)]
pub struct ReportWriter {
    store: Arc<dyn ReportStore>,
}

impl ReportWriter {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Builds the report for a finished execution
    pub fn build_report(
        handle: JobHandle,
        definition: &JobDefinition,
        outcome: &ExecutionOutcome,
        start_time: DateTime<Utc>,
    ) -> NewTestReport {
        let result_payload = serde_json::to_value(outcome).unwrap_or_else(|e| {
            warn!("Failed to serialize outcome for job {}: {}", handle, e);
            serde_json::Value::Null
        });

        NewTestReport {
            project_id: definition.project_id(),
            name: definition.kind().report_name(definition.name()),
            job_kind: definition.kind(),
            handle,
            result_payload,
            pass_rate: outcome.pass_rate(),
            start_time,
            duration: outcome.duration_seconds,
        }
    }

    /// Writes the report for a finished execution
    ///
    /// # Returns
    /// The stored report, or `None` if it could not be written
    pub async fn write(
        &self,
        handle: JobHandle,
        definition: &JobDefinition,
        outcome: &ExecutionOutcome,
        start_time: DateTime<Utc>,
    ) -> Option<TestReport> {
        let report = Self::build_report(handle, definition, outcome, start_time);

        match self.store.save_report(report).await {
            Ok(saved) => {
                info!("Saved report {} for job {}", saved.id, handle);
                Some(saved)
            }
            Err(StoreError::DuplicateReport(_)) => {
                warn!("Report for job {} already exists, keeping the first", handle);
                None
            }
            Err(e) => {
                error!("Failed to save report for job {}: {}", handle, e);
                None
            }
        }
    }
}
