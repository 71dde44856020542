//! Task Repository
//!
//! Persists task state records. The full record is stored as JSONB next to a
//! few indexed columns used for lookups and expiry.

use chrono::{DateTime, Utc};
use probe_core::domain::job::{JobHandle, JobState};
use probe_core::domain::task::TaskRecord;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

/// Insert a freshly submitted record
pub async fn create(pool: &PgPool, record: &TaskRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO task_states
            (handle, kind, definition_id, state, record, submitted_at, updated_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6, $7)
        "#,
    )
    .bind(record.handle.as_uuid())
    .bind(record.kind.as_str())
    .bind(record.definition_id)
    .bind(record.state.as_str())
    .bind(Json(record))
    .bind(record.submitted_at)
    .bind(record.expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a record that has not expired
pub async fn find_live(
    pool: &PgPool,
    handle: JobHandle,
    now: DateTime<Utc>,
) -> Result<Option<TaskRecord>, sqlx::Error> {
    let record = sqlx::query_scalar::<_, Json<TaskRecord>>(
        r#"
        SELECT record
        FROM task_states
        WHERE handle = $1 AND (expires_at IS NULL OR expires_at > $2)
        "#,
    )
    .bind(handle.as_uuid())
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(record.map(|Json(record)| record))
}

/// Lock a record for the rest of the surrounding transaction
pub async fn find_for_update(
    conn: &mut PgConnection,
    handle: JobHandle,
) -> Result<Option<TaskRecord>, sqlx::Error> {
    let record = sqlx::query_scalar::<_, Json<TaskRecord>>(
        "SELECT record FROM task_states WHERE handle = $1 FOR UPDATE",
    )
    .bind(handle.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(record.map(|Json(record)| record))
}

/// Replace a record as a whole
pub async fn update(conn: &mut PgConnection, record: &TaskRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE task_states
        SET state = $2, record = $3, updated_at = $4, expires_at = $5
        WHERE handle = $1
        "#,
    )
    .bind(record.handle.as_uuid())
    .bind(record.state.as_str())
    .bind(Json(record))
    .bind(Utc::now())
    .bind(record.expires_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Find records that have not reached a terminal state
pub async fn find_unfinished(pool: &PgPool) -> Result<Vec<TaskRecord>, sqlx::Error> {
    let records = sqlx::query_scalar::<_, Json<TaskRecord>>(
        r#"
        SELECT record
        FROM task_states
        WHERE state IN ($1, $2, $3)
        ORDER BY submitted_at
        "#,
    )
    .bind(JobState::Pending.as_str())
    .bind(JobState::Started.as_str())
    .bind(JobState::Progress.as_str())
    .fetch_all(pool)
    .await?;

    Ok(records.into_iter().map(|Json(record)| record).collect())
}

/// Delete records whose retention window ended
pub async fn delete_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM task_states WHERE expires_at IS NOT NULL AND expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
