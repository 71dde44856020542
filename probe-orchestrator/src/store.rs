//! PostgreSQL-backed stores
//!
//! Implementations of the runner's store traits on top of the repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use probe_core::domain::definition::{DefinitionId, JobDefinition};
use probe_core::domain::job::{JobHandle, JobKind};
use probe_core::domain::report::{NewTestReport, TestReport};
use probe_core::domain::task::{StateUpdate, TaskRecord};
use probe_core::dto::report::ReportFilter;
use probe_runner::StoreError;
use probe_runner::store::{DefinitionStore, ReportStore, StateStore};
use sqlx::PgPool;

use crate::repository::{definition_repository, report_repository, task_repository};

pub struct PgDefinitionStore {
    pool: PgPool,
}

impl PgDefinitionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DefinitionStore for PgDefinitionStore {
    async fn get_definition(
        &self,
        kind: JobKind,
        id: DefinitionId,
    ) -> Result<Option<JobDefinition>, StoreError> {
        let definition = match kind {
            JobKind::ApiCase => definition_repository::find_api_case(&self.pool, id)
                .await
                .map_err(StoreError::backend)?
                .map(JobDefinition::ApiCase),
            JobKind::ApiSuite => definition_repository::find_api_suite(&self.pool, id)
                .await
                .map_err(StoreError::backend)?
                .map(JobDefinition::ApiSuite),
            JobKind::UiCase => definition_repository::find_ui_case(&self.pool, id)
                .await
                .map_err(StoreError::backend)?
                .map(JobDefinition::UiCase),
            JobKind::Performance => definition_repository::find_performance_test(&self.pool, id)
                .await
                .map_err(StoreError::backend)?
                .map(JobDefinition::Performance),
        };

        Ok(definition)
    }
}

pub struct PgStateStore {
    pool: PgPool,
    retention: chrono::Duration,
}

impl PgStateStore {
    pub fn new(pool: PgPool, retention: chrono::Duration) -> Self {
        Self { pool, retention }
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn insert(&self, record: TaskRecord) -> Result<(), StoreError> {
        task_repository::create(&self.pool, &record)
            .await
            .map_err(StoreError::backend)
    }

    async fn get(&self, handle: JobHandle) -> Result<Option<TaskRecord>, StoreError> {
        task_repository::find_live(&self.pool, handle, Utc::now())
            .await
            .map_err(StoreError::backend)
    }

    async fn apply(
        &self,
        handle: JobHandle,
        update: StateUpdate,
    ) -> Result<TaskRecord, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        let mut record = task_repository::find_for_update(&mut *tx, handle)
            .await
            .map_err(StoreError::backend)?
            .ok_or(StoreError::TaskNotFound(handle))?;

        // Rejected transitions roll back when `tx` is dropped
        record.apply(update, self.retention, Utc::now())?;

        task_repository::update(&mut *tx, &record)
            .await
            .map_err(StoreError::backend)?;
        tx.commit().await.map_err(StoreError::backend)?;

        Ok(record)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        task_repository::delete_expired(&self.pool, now)
            .await
            .map_err(StoreError::backend)
    }

    async fn list_unfinished(&self) -> Result<Vec<TaskRecord>, StoreError> {
        task_repository::find_unfinished(&self.pool)
            .await
            .map_err(StoreError::backend)
    }
}

pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn save_report(&self, report: NewTestReport) -> Result<TestReport, StoreError> {
        let handle = report.handle;

        report_repository::create(&self.pool, report)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::DuplicateReport(handle)
                }
                other => StoreError::backend(other),
            })
    }

    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<TestReport>, StoreError> {
        report_repository::list(&self.pool, filter)
            .await
            .map_err(StoreError::backend)
    }

    async fn get_report(&self, id: i64) -> Result<Option<TestReport>, StoreError> {
        report_repository::find_by_id(&self.pool, id)
            .await
            .map_err(StoreError::backend)
    }

    async fn find_by_handle(&self, handle: JobHandle) -> Result<Option<TestReport>, StoreError> {
        report_repository::find_by_handle(&self.pool, handle)
            .await
            .map_err(StoreError::backend)
    }
}
