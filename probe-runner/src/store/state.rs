//! State store
//!
//! Registry of task records keyed by job handle. Updates replace a record as a
//! whole, so concurrent readers never observe a half-applied transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use probe_core::domain::job::JobHandle;
use probe_core::domain::task::{StateUpdate, TaskRecord};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;

/// Store trait for task state records
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Registers a freshly submitted record
    async fn insert(&self, record: TaskRecord) -> Result<(), StoreError>;

    /// Fetches a record
    ///
    /// Records past their retention window are treated as absent.
    async fn get(&self, handle: JobHandle) -> Result<Option<TaskRecord>, StoreError>;

    /// Applies a lifecycle transition atomically and returns the new record
    ///
    /// # Errors
    /// * `TaskNotFound` if the handle is unknown
    /// * `InvalidTransition` if the record's current state forbids the update
    async fn apply(&self, handle: JobHandle, update: StateUpdate)
    -> Result<TaskRecord, StoreError>;

    /// Deletes every record whose retention window ended before `now`
    ///
    /// # Returns
    /// Number of records removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Records that have not reached a terminal state
    async fn list_unfinished(&self) -> Result<Vec<TaskRecord>, StoreError>;
}

/// In-memory implementation of StateStore
pub struct InMemoryStateStore {
    records: RwLock<HashMap<JobHandle, TaskRecord>>,
    retention: chrono::Duration,
}

impl InMemoryStateStore {
    /// Creates an empty store
    ///
    /// # Arguments
    /// * `retention` - How long terminal records stay readable
    pub fn new(retention: chrono::Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Number of records held, expired ones included
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn insert(&self, record: TaskRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.handle, record);
        Ok(())
    }

    async fn get(&self, handle: JobHandle) -> Result<Option<TaskRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .get(&handle)
            .filter(|record| !record.is_expired(Utc::now()))
            .cloned())
    }

    async fn apply(
        &self,
        handle: JobHandle,
        update: StateUpdate,
    ) -> Result<TaskRecord, StoreError> {
        let mut records = self.records.write().await;
        let current = records
            .get(&handle)
            .ok_or(StoreError::TaskNotFound(handle))?;

        let mut next = current.clone();
        next.apply(update, self.retention, Utc::now())?;
        records.insert(handle, next.clone());

        Ok(next)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        let removed = (before - records.len()) as u64;

        if removed > 0 {
            debug!("Purged {} expired task record(s)", removed);
        }

        Ok(removed)
    }

    async fn list_unfinished(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| !record.state.is_terminal())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_core::domain::job::{JobKind, JobState};
    use probe_core::domain::outcome::{ApiCaseResult, ExecutionOutcome, OutcomePayload};

    fn store() -> InMemoryStateStore {
        InMemoryStateStore::new(chrono::Duration::hours(1))
    }

    fn outcome() -> ExecutionOutcome {
        ExecutionOutcome::succeeded(0.1, OutcomePayload::ApiCase(ApiCaseResult::default()))
    }

    #[tokio::test]
    async fn test_apply_replaces_record() {
        let store = store();
        let handle = JobHandle::new();
        store
            .insert(TaskRecord::pending(handle, JobKind::ApiCase, 1))
            .await
            .unwrap();

        let record = store.apply(handle, StateUpdate::Started).await.unwrap();
        assert_eq!(record.state, JobState::Started);

        let fetched = store.get(handle).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn test_terminal_record_rejects_updates() {
        let store = store();
        let handle = JobHandle::new();
        store
            .insert(TaskRecord::pending(handle, JobKind::ApiCase, 1))
            .await
            .unwrap();
        store.apply(handle, StateUpdate::Started).await.unwrap();
        store
            .apply(handle, StateUpdate::Succeeded(outcome()))
            .await
            .unwrap();

        let err = store
            .apply(
                handle,
                StateUpdate::Failed {
                    error: "late".to_string(),
                    outcome: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));

        let record = store.get(handle).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Success);
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let store = store();
        let handle = JobHandle::new();

        assert!(store.get(handle).await.unwrap().is_none());
        let err = store.apply(handle, StateUpdate::Started).await.unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound(h) if h == handle));
    }

    #[tokio::test]
    async fn test_expired_records_are_hidden_and_purged() {
        let store = InMemoryStateStore::new(chrono::Duration::zero());
        let handle = JobHandle::new();
        store
            .insert(TaskRecord::pending(handle, JobKind::UiCase, 3))
            .await
            .unwrap();
        store.apply(handle, StateUpdate::Cancelled).await.unwrap();

        // Zero retention: expired the instant it became terminal
        assert!(store.get(handle).await.unwrap().is_none());
        assert_eq!(store.len().await, 1);

        let removed = store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_running_records_are_never_purged() {
        let store = InMemoryStateStore::new(chrono::Duration::zero());
        let handle = JobHandle::new();
        store
            .insert(TaskRecord::pending(handle, JobKind::ApiCase, 1))
            .await
            .unwrap();
        store.apply(handle, StateUpdate::Started).await.unwrap();

        let removed = store
            .purge_expired(Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(store.get(handle).await.unwrap().is_some());
    }
}
