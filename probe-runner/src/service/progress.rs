//! Progress reporting service
//!
//! Adapters publish progress through [`ProgressReporter`]. Reporting is fire and
//! forget: a store failure is logged and the job keeps running.

use async_trait::async_trait;
use probe_core::domain::job::JobHandle;
use probe_core::domain::progress::ProgressSnapshot;
use probe_core::domain::task::StateUpdate;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::store::StateStore;

/// Sink for progress updates of a running job
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Publishes a progress snapshot
    ///
    /// # Arguments
    /// * `handle` - Job being reported on
    /// * `percent` - Completion percentage (clamped to 100)
    /// * `current_step` - Short step label
    /// * `message` - Free-text status line
    async fn report(&self, handle: JobHandle, percent: u8, current_step: &str, message: &str);
}

/// Writes progress into the state store as PROGRESS transitions
pub struct StoreProgressReporter {
    states: Arc<dyn StateStore>,
}

impl StoreProgressReporter {
    pub fn new(states: Arc<dyn StateStore>) -> Self {
        Self { states }
    }
}

#[async_trait]
impl ProgressReporter for StoreProgressReporter {
    async fn report(&self, handle: JobHandle, percent: u8, current_step: &str, message: &str) {
        debug!("Job {} progress {}%: {}", handle, percent, message);

        let snapshot = ProgressSnapshot::new(percent, current_step, message);
        if let Err(e) = self
            .states
            .apply(handle, StateUpdate::Progress(snapshot))
            .await
        {
            warn!("Failed to record progress for job {}: {}", handle, e);
        }
    }
}

/// Discards every update
pub struct NoopProgressReporter;

#[async_trait]
impl ProgressReporter for NoopProgressReporter {
    async fn report(&self, _handle: JobHandle, _percent: u8, _current_step: &str, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStateStore;
    use probe_core::domain::job::{JobKind, JobState};
    use probe_core::domain::task::TaskRecord;

    #[tokio::test]
    async fn test_progress_lands_in_store() {
        let states = Arc::new(InMemoryStateStore::new(chrono::Duration::hours(1)));
        let handle = JobHandle::new();
        states
            .insert(TaskRecord::pending(handle, JobKind::ApiCase, 1))
            .await
            .unwrap();
        states.apply(handle, StateUpdate::Started).await.unwrap();

        let reporter = StoreProgressReporter::new(states.clone());
        reporter.report(handle, 150, "request", "sending GET").await;

        let record = states.get(handle).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Progress);
        let progress = record.progress.unwrap();
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.current_step, "request");
        assert_eq!(progress.status_message, "sending GET");
    }

    #[tokio::test]
    async fn test_concurrent_reports_never_mix_fields() {
        let states = Arc::new(InMemoryStateStore::new(chrono::Duration::hours(1)));
        let handle = JobHandle::new();
        states
            .insert(TaskRecord::pending(handle, JobKind::UiCase, 1))
            .await
            .unwrap();
        states.apply(handle, StateUpdate::Started).await.unwrap();

        for _ in 0..20 {
            let a = StoreProgressReporter::new(states.clone());
            let b = StoreProgressReporter::new(states.clone());
            tokio::join!(
                a.report(handle, 10, "A", "step A"),
                b.report(handle, 50, "B", "step B"),
            );

            let progress = states.get(handle).await.unwrap().unwrap().progress.unwrap();
            let seen = (
                progress.percent,
                progress.current_step.as_str(),
                progress.status_message.as_str(),
            );
            assert!(seen == (10, "A", "step A") || seen == (50, "B", "step B"));
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let states = Arc::new(InMemoryStateStore::new(chrono::Duration::hours(1)));
        let reporter = StoreProgressReporter::new(states);

        // Unknown handle: the store rejects the update, the reporter must not panic
        reporter.report(JobHandle::new(), 10, "prepare", "x").await;
    }
}
