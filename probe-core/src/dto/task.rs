//! Task DTOs for submission and status polling

use serde::{Deserialize, Serialize};

use crate::domain::definition::DefinitionId;
use crate::domain::job::{JobHandle, JobKind, JobState};
use crate::domain::outcome::ExecutionOutcome;
use crate::domain::task::TaskRecord;

/// Status message reported for jobs no worker has claimed yet
pub const DEFAULT_PENDING_MESSAGE: &str = "submitted, awaiting a worker";

/// Request to run a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    pub kind: JobKind,
    pub definition_id: DefinitionId,
}

/// Response to a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submitted {
    pub handle: JobHandle,
    pub state: JobState,
}

/// Current status of a job as seen by a polling client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub handle: JobHandle,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskStatus {
    /// Builds the client-facing status for a handle
    ///
    /// A missing record (never submitted, not yet visible, or expired) reads as
    /// `PENDING`, like a freshly submitted job.
    pub fn from_record(handle: JobHandle, record: Option<&TaskRecord>) -> Self {
        let Some(record) = record else {
            return Self::pending(handle);
        };

        let progress = record.progress.as_ref();
        let mut status_message = progress.map(|p| p.status_message.clone());
        if record.state == JobState::Pending && status_message.is_none() {
            status_message = Some(DEFAULT_PENDING_MESSAGE.to_string());
        }

        // A finished job is complete even if its last snapshot was not
        let percent = match record.state {
            JobState::Success => Some(100),
            _ => progress.map(|p| p.percent),
        };

        Self {
            handle,
            state: record.state,
            percent,
            current_step: progress.map(|p| p.current_step.clone()),
            status_message,
            result: if record.state.is_terminal() {
                record.result.clone()
            } else {
                None
            },
            error: if record.state == JobState::Success {
                None
            } else {
                record.error.clone()
            },
        }
    }

    fn pending(handle: JobHandle) -> Self {
        Self {
            handle,
            state: JobState::Pending,
            percent: None,
            current_step: None,
            status_message: Some(DEFAULT_PENDING_MESSAGE.to_string()),
            result: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::{ApiCaseResult, OutcomePayload};
    use crate::domain::progress::ProgressSnapshot;
    use crate::domain::task::StateUpdate;

    fn retention() -> chrono::Duration {
        chrono::Duration::hours(1)
    }

    #[test]
    fn test_unknown_handle_reads_as_pending() {
        let handle = JobHandle::new();
        let status = TaskStatus::from_record(handle, None);
        assert_eq!(status.state, JobState::Pending);
        assert_eq!(status.status_message.as_deref(), Some(DEFAULT_PENDING_MESSAGE));
        assert!(status.result.is_none());
    }

    #[test]
    fn test_pending_record_gets_default_message() {
        let record = TaskRecord::pending(JobHandle::new(), JobKind::ApiCase, 1);
        let status = TaskStatus::from_record(record.handle, Some(&record));
        assert_eq!(status.state, JobState::Pending);
        assert_eq!(status.status_message.as_deref(), Some(DEFAULT_PENDING_MESSAGE));
    }

    #[test]
    fn test_progress_fields_come_from_snapshot() {
        let mut record = TaskRecord::pending(JobHandle::new(), JobKind::UiCase, 1);
        let now = chrono::Utc::now();
        record.apply(StateUpdate::Started, retention(), now).unwrap();
        record
            .apply(
                StateUpdate::Progress(ProgressSnapshot::new(45, "step 3", "clicking login")),
                retention(),
                now,
            )
            .unwrap();

        let status = TaskStatus::from_record(record.handle, Some(&record));
        assert_eq!(status.state, JobState::Progress);
        assert_eq!(status.percent, Some(45));
        assert_eq!(status.current_step.as_deref(), Some("step 3"));
        assert_eq!(status.status_message.as_deref(), Some("clicking login"));
    }

    #[test]
    fn test_success_reports_full_progress() {
        let now = chrono::Utc::now();
        let mut record = TaskRecord::pending(JobHandle::new(), JobKind::ApiCase, 1);
        record.apply(StateUpdate::Started, retention(), now).unwrap();
        record
            .apply(
                StateUpdate::Progress(ProgressSnapshot::new(90, "assertions", "checking body")),
                retention(),
                now,
            )
            .unwrap();
        record
            .apply(
                StateUpdate::Succeeded(ExecutionOutcome::succeeded(
                    0.2,
                    OutcomePayload::ApiCase(ApiCaseResult::default()),
                )),
                retention(),
                now,
            )
            .unwrap();

        let status = TaskStatus::from_record(record.handle, Some(&record));
        assert_eq!(status.percent, Some(100));
        assert_eq!(status.current_step.as_deref(), Some("assertions"));
    }

    #[test]
    fn test_success_carries_result_and_failure_carries_error() {
        let now = chrono::Utc::now();
        let outcome =
            ExecutionOutcome::succeeded(1.0, OutcomePayload::ApiCase(ApiCaseResult::default()));

        let mut ok = TaskRecord::pending(JobHandle::new(), JobKind::ApiCase, 1);
        ok.apply(StateUpdate::Started, retention(), now).unwrap();
        ok.apply(StateUpdate::Succeeded(outcome), retention(), now)
            .unwrap();
        let status = TaskStatus::from_record(ok.handle, Some(&ok));
        assert_eq!(status.state, JobState::Success);
        assert_eq!(status.percent, Some(100));
        assert!(status.result.unwrap().success);
        assert!(status.error.is_none());

        let mut failed = TaskRecord::pending(JobHandle::new(), JobKind::ApiCase, 1);
        failed.apply(StateUpdate::Started, retention(), now).unwrap();
        failed
            .apply(
                StateUpdate::Failed {
                    error: "Request failed: connection refused".to_string(),
                    outcome: None,
                },
                retention(),
                now,
            )
            .unwrap();
        let status = TaskStatus::from_record(failed.handle, Some(&failed));
        assert_eq!(status.state, JobState::Failure);
        assert_eq!(
            status.error.as_deref(),
            Some("Request failed: connection refused")
        );
    }
}
