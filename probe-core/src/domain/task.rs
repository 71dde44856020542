//! Task record and its state machine
//!
//! A task record is the State Store's view of one submitted job. All
//! transitions go through [`TaskRecord::apply`], which is shared by every store
//! backend so the lifecycle rules live in one place:
//!
//! ```text
//! PENDING -> STARTED -> PROGRESS* -> SUCCESS | FAILURE
//! PENDING -> CANCELLED
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::definition::DefinitionId;
use crate::domain::job::{JobHandle, JobKind, JobState};
use crate::domain::outcome::ExecutionOutcome;
use crate::domain::progress::ProgressSnapshot;

/// Current state of one submitted job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub handle: JobHandle,
    pub kind: JobKind,
    pub definition_id: DefinitionId,
    pub state: JobState,
    pub progress: Option<ProgressSnapshot>,
    /// Outcome of a finished execution
    pub result: Option<ExecutionOutcome>,
    /// Summarized failure message
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set once terminal; after this instant the record is unreadable
    pub expires_at: Option<DateTime<Utc>>,
}

/// A lifecycle transition requested by the scheduler, a worker or a client
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// A worker claimed the job
    Started,
    /// Incremental progress from the executing adapter
    Progress(ProgressSnapshot),
    /// Execution finished and the outcome passed
    Succeeded(ExecutionOutcome),
    /// Execution finished unsuccessfully or could not run at all
    Failed {
        error: String,
        outcome: Option<ExecutionOutcome>,
    },
    /// Cancelled before any worker claimed it
    Cancelled,
}

impl StateUpdate {
    /// State the record ends up in when the update applies
    pub fn target_state(&self) -> JobState {
        match self {
            StateUpdate::Started => JobState::Started,
            StateUpdate::Progress(_) => JobState::Progress,
            StateUpdate::Succeeded(_) => JobState::Success,
            StateUpdate::Failed { .. } => JobState::Failure,
            StateUpdate::Cancelled => JobState::Cancelled,
        }
    }

    /// States from which this update may be applied
    pub fn allowed_from(&self) -> &'static [JobState] {
        match self {
            StateUpdate::Started | StateUpdate::Cancelled => &[JobState::Pending],
            StateUpdate::Progress(_) | StateUpdate::Succeeded(_) => {
                &[JobState::Started, JobState::Progress]
            }
            StateUpdate::Failed { .. } => {
                &[JobState::Pending, JobState::Started, JobState::Progress]
            }
        }
    }
}

/// Rejected lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub handle: JobHandle,
    pub from: JobState,
    pub to: JobState,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task {} cannot move from {} to {}",
            self.handle, self.from, self.to
        )
    }
}

impl std::error::Error for TransitionError {}

impl TaskRecord {
    /// Fresh record for a just-submitted job
    pub fn pending(handle: JobHandle, kind: JobKind, definition_id: DefinitionId) -> Self {
        Self {
            handle,
            kind,
            definition_id,
            state: JobState::Pending,
            progress: None,
            result: None,
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            expires_at: None,
        }
    }

    /// Applies a transition in place
    ///
    /// Terminal records never change. `retention` sets `expires_at` when the
    /// record becomes terminal.
    pub fn apply(
        &mut self,
        update: StateUpdate,
        retention: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !update.allowed_from().contains(&self.state) {
            return Err(TransitionError {
                handle: self.handle,
                from: self.state,
                to: update.target_state(),
            });
        }

        self.state = update.target_state();

        match update {
            StateUpdate::Started => {
                self.started_at = Some(now);
            }
            StateUpdate::Progress(snapshot) => {
                self.progress = Some(snapshot);
            }
            StateUpdate::Succeeded(outcome) => {
                self.result = Some(outcome);
            }
            StateUpdate::Failed { error, outcome } => {
                self.error = Some(error);
                self.result = outcome;
            }
            StateUpdate::Cancelled => {
                self.error = Some("cancelled before a worker picked it up".to_string());
            }
        }

        if self.state.is_terminal() {
            self.finished_at = Some(now);
            self.expires_at = Some(now + retention);
        }

        Ok(())
    }

    /// Whether the retention window has elapsed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::{ApiCaseResult, OutcomePayload};

    fn retention() -> chrono::Duration {
        chrono::Duration::hours(1)
    }

    fn outcome() -> ExecutionOutcome {
        ExecutionOutcome::succeeded(0.5, OutcomePayload::ApiCase(ApiCaseResult::default()))
    }

    #[test]
    fn test_full_lifecycle() {
        let mut record = TaskRecord::pending(JobHandle::new(), JobKind::ApiCase, 1);
        let now = Utc::now();

        record.apply(StateUpdate::Started, retention(), now).unwrap();
        assert_eq!(record.state, JobState::Started);
        assert!(record.started_at.is_some());

        record
            .apply(
                StateUpdate::Progress(ProgressSnapshot::new(40, "request", "sending")),
                retention(),
                now,
            )
            .unwrap();
        assert_eq!(record.state, JobState::Progress);
        assert_eq!(record.progress.as_ref().unwrap().percent, 40);

        record
            .apply(StateUpdate::Succeeded(outcome()), retention(), now)
            .unwrap();
        assert_eq!(record.state, JobState::Success);
        assert_eq!(record.expires_at, Some(now + retention()));
        assert!(record.result.is_some());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut record = TaskRecord::pending(JobHandle::new(), JobKind::UiCase, 1);
        let now = Utc::now();
        record.apply(StateUpdate::Started, retention(), now).unwrap();
        record
            .apply(
                StateUpdate::Failed {
                    error: "timed out".to_string(),
                    outcome: None,
                },
                retention(),
                now,
            )
            .unwrap();

        let err = record
            .apply(StateUpdate::Succeeded(outcome()), retention(), now)
            .unwrap_err();
        assert_eq!(err.from, JobState::Failure);
        assert_eq!(err.to, JobState::Success);

        assert!(
            record
                .apply(
                    StateUpdate::Progress(ProgressSnapshot::new(90, "late", "late")),
                    retention(),
                    now
                )
                .is_err()
        );
        assert_eq!(record.state, JobState::Failure);
        assert_eq!(record.error.as_deref(), Some("timed out"));
    }

    #[test]
    fn test_started_only_once() {
        let mut record = TaskRecord::pending(JobHandle::new(), JobKind::ApiCase, 1);
        let now = Utc::now();
        record.apply(StateUpdate::Started, retention(), now).unwrap();
        assert!(record.apply(StateUpdate::Started, retention(), now).is_err());
    }

    #[test]
    fn test_cancel_only_while_pending() {
        let now = Utc::now();

        let mut queued = TaskRecord::pending(JobHandle::new(), JobKind::Performance, 3);
        queued.apply(StateUpdate::Cancelled, retention(), now).unwrap();
        assert_eq!(queued.state, JobState::Cancelled);
        assert!(queued.apply(StateUpdate::Started, retention(), now).is_err());

        let mut running = TaskRecord::pending(JobHandle::new(), JobKind::Performance, 3);
        running.apply(StateUpdate::Started, retention(), now).unwrap();
        assert!(running.apply(StateUpdate::Cancelled, retention(), now).is_err());
    }

    #[test]
    fn test_progress_requires_pickup() {
        let mut record = TaskRecord::pending(JobHandle::new(), JobKind::ApiCase, 1);
        let result = record.apply(
            StateUpdate::Progress(ProgressSnapshot::new(10, "a", "a")),
            retention(),
            Utc::now(),
        );
        assert!(result.is_err());
        assert_eq!(record.state, JobState::Pending);
    }

    #[test]
    fn test_expiry() {
        let mut record = TaskRecord::pending(JobHandle::new(), JobKind::ApiCase, 1);
        let now = Utc::now();
        assert!(!record.is_expired(now + chrono::Duration::days(30)));

        record.apply(StateUpdate::Started, retention(), now).unwrap();
        record
            .apply(StateUpdate::Succeeded(outcome()), retention(), now)
            .unwrap();

        assert!(!record.is_expired(now + chrono::Duration::minutes(59)));
        assert!(record.is_expired(now + chrono::Duration::minutes(60)));
    }
}
