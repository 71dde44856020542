//! Runner error types
//!
//! Store failures, submission rejections and cancellation rejections. Execution
//! failures are not errors here: adapters fold them into an `ExecutionOutcome`.

use probe_core::domain::definition::DefinitionId;
use probe_core::domain::job::{JobHandle, JobKind, JobState};
use probe_core::domain::task::TransitionError;
use thiserror::Error;

/// Errors raised by state, definition and report stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Task {0} not found")]
    TaskNotFound(JobHandle),

    #[error("A report for task {0} already exists")]
    DuplicateReport(JobHandle),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Wraps a backend-specific error (database driver, I/O)
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// Reasons a submission is rejected before a job is queued
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{kind} definition {id} not found")]
    DefinitionNotFound { kind: JobKind, id: DefinitionId },

    #[error("Job queue is full ({capacity} jobs waiting)")]
    CapacityExceeded { capacity: usize },

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reasons a cancellation request is rejected
#[derive(Debug, Error)]
pub enum CancelError {
    #[error("Task {0} not found")]
    NotFound(JobHandle),

    #[error("Task {handle} is already {state} and can no longer be cancelled")]
    AlreadyRunning { handle: JobHandle, state: JobState },

    #[error("Task {handle} already finished with state {state}")]
    AlreadyFinished { handle: JobHandle, state: JobState },

    #[error(transparent)]
    Store(#[from] StoreError),
}
