//! Test report domain types

use serde::{Deserialize, Serialize};

use crate::domain::definition::ProjectId;
use crate::domain::job::{JobHandle, JobKind};

/// Report about to be persisted
///
/// Written exactly once per job attempt, failed attempts included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTestReport {
    pub project_id: ProjectId,
    pub name: String,
    pub job_kind: JobKind,
    pub handle: JobHandle,
    /// Serialized [`ExecutionOutcome`](crate::domain::outcome::ExecutionOutcome)
    pub result_payload: serde_json::Value,
    /// Within 0-100
    pub pass_rate: f64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// Seconds
    pub duration: f64,
}

/// Persisted test report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub id: i64,
    pub project_id: ProjectId,
    pub name: String,
    pub job_kind: JobKind,
    pub handle: JobHandle,
    pub result_payload: serde_json::Value,
    pub pass_rate: f64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub duration: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TestReport {
    /// Materializes a new report with its store-assigned id
    pub fn from_new(
        id: i64,
        report: NewTestReport,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id,
            project_id: report.project_id,
            name: report.name,
            job_kind: report.job_kind,
            handle: report.handle,
            result_payload: report.result_payload,
            pass_rate: report.pass_rate,
            start_time: report.start_time,
            duration: report.duration,
            created_at,
        }
    }
}
