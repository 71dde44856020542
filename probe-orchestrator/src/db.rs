use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Definition tables are owned by the application; created here so a fresh
    // database is usable
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_test_cases (
            id BIGSERIAL PRIMARY KEY,
            project_id BIGINT NOT NULL,
            name VARCHAR(255) NOT NULL,
            method VARCHAR(10) NOT NULL,
            url TEXT NOT NULL,
            headers JSONB,
            params JSONB,
            body JSONB,
            assertions JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_test_suites (
            id BIGSERIAL PRIMARY KEY,
            project_id BIGINT NOT NULL,
            name VARCHAR(255) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_test_suite_cases (
            id BIGSERIAL PRIMARY KEY,
            suite_id BIGINT NOT NULL REFERENCES api_test_suites(id) ON DELETE CASCADE,
            case_id BIGINT NOT NULL,
            order_index INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ui_test_cases (
            id BIGSERIAL PRIMARY KEY,
            project_id BIGINT NOT NULL,
            name VARCHAR(255) NOT NULL,
            script TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS performance_tests (
            id BIGSERIAL PRIMARY KEY,
            project_id BIGINT NOT NULL,
            name VARCHAR(255) NOT NULL,
            plan_path TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One report per job handle
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_reports (
            id BIGSERIAL PRIMARY KEY,
            project_id BIGINT NOT NULL,
            name VARCHAR(255) NOT NULL,
            job_kind VARCHAR(20) NOT NULL,
            handle UUID NOT NULL UNIQUE,
            result_data JSONB NOT NULL,
            pass_rate DOUBLE PRECISION NOT NULL,
            start_time TIMESTAMPTZ NOT NULL,
            duration DOUBLE PRECISION NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_states (
            handle UUID PRIMARY KEY,
            kind VARCHAR(20) NOT NULL,
            definition_id BIGINT NOT NULL,
            state VARCHAR(20) NOT NULL,
            record JSONB NOT NULL,
            submitted_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            expires_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_suite_cases_suite ON api_test_suite_cases(suite_id, order_index)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_reports_project ON test_reports(project_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_task_states_expires ON task_states(expires_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed");

    Ok(())
}
