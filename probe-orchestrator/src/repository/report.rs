//! Report Repository
//!
//! Handles all database operations related to test reports.

use chrono::{DateTime, Utc};
use probe_core::domain::job::{JobHandle, JobKind};
use probe_core::domain::report::{NewTestReport, TestReport};
use probe_core::dto::report::ReportFilter;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a new report
///
/// Fails with a unique violation if the handle already has a report.
pub async fn create(pool: &PgPool, report: NewTestReport) -> Result<TestReport, sqlx::Error> {
    let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
        r#"
        INSERT INTO test_reports
            (project_id, name, job_kind, handle, result_data, pass_rate, start_time, duration)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, created_at
        "#,
    )
    .bind(report.project_id)
    .bind(&report.name)
    .bind(report.job_kind.as_str())
    .bind(report.handle.as_uuid())
    .bind(&report.result_payload)
    .bind(report.pass_rate)
    .bind(report.start_time)
    .bind(report.duration)
    .fetch_one(pool)
    .await?;

    Ok(TestReport::from_new(id, report, created_at))
}

/// Find a report by ID
pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<TestReport>, sqlx::Error> {
    let row = sqlx::query_as::<_, ReportRow>(
        r#"
        SELECT id, project_id, name, job_kind, handle, result_data, pass_rate,
               start_time, duration, created_at
        FROM test_reports
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(TestReport::try_from).transpose()
}

/// Find the report written for a job
pub async fn find_by_handle(
    pool: &PgPool,
    handle: JobHandle,
) -> Result<Option<TestReport>, sqlx::Error> {
    let row = sqlx::query_as::<_, ReportRow>(
        r#"
        SELECT id, project_id, name, job_kind, handle, result_data, pass_rate,
               start_time, duration, created_at
        FROM test_reports
        WHERE handle = $1
        "#,
    )
    .bind(handle.as_uuid())
    .fetch_optional(pool)
    .await?;

    row.map(TestReport::try_from).transpose()
}

/// List reports, newest first
pub async fn list(pool: &PgPool, filter: &ReportFilter) -> Result<Vec<TestReport>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ReportRow>(
        r#"
        SELECT id, project_id, name, job_kind, handle, result_data, pass_rate,
               start_time, duration, created_at
        FROM test_reports
        WHERE ($1::BIGINT IS NULL OR project_id = $1)
          AND ($2::TEXT IS NULL OR job_kind = $2)
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(filter.project_id)
    .bind(filter.kind.map(|kind| kind.as_str()))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TestReport::try_from).collect()
}

// =============================================================================
// Internal row type for database mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: i64,
    project_id: i64,
    name: String,
    job_kind: String,
    handle: Uuid,
    result_data: JsonValue,
    pass_rate: f64,
    start_time: DateTime<Utc>,
    duration: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for TestReport {
    type Error = sqlx::Error;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let job_kind: JobKind = row
            .job_kind
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

        Ok(TestReport {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            job_kind,
            handle: JobHandle::from(row.handle),
            result_payload: row.result_data,
            pass_rate: row.pass_rate,
            start_time: row.start_time,
            duration: row.duration,
            created_at: row.created_at,
        })
    }
}
