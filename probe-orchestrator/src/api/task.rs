//! Task API Handlers
//!
//! Submission, status polling and cancellation of test jobs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use probe_core::domain::definition::DefinitionId;
use probe_core::domain::job::{JobHandle, JobKind, JobState};
use probe_core::domain::report::TestReport;
use probe_core::dto::task::{SubmitJob, Submitted, TaskStatus};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

// =============================================================================
// Submission Endpoints
// =============================================================================

/// POST /tasks
/// Queue a job of any kind
pub async fn submit_task(
    State(state): State<AppState>,
    Json(req): Json<SubmitJob>,
) -> ApiResult<(StatusCode, Json<Submitted>)> {
    submit(&state, req.kind, req.definition_id).await
}

/// POST /api_tests/cases/{id}/run
pub async fn run_api_case(
    State(state): State<AppState>,
    Path(id): Path<DefinitionId>,
) -> ApiResult<(StatusCode, Json<Submitted>)> {
    submit(&state, JobKind::ApiCase, id).await
}

/// POST /api_tests/suites/{id}/run
pub async fn run_api_suite(
    State(state): State<AppState>,
    Path(id): Path<DefinitionId>,
) -> ApiResult<(StatusCode, Json<Submitted>)> {
    submit(&state, JobKind::ApiSuite, id).await
}

/// POST /ui_tests/cases/{id}/run
pub async fn run_ui_case(
    State(state): State<AppState>,
    Path(id): Path<DefinitionId>,
) -> ApiResult<(StatusCode, Json<Submitted>)> {
    submit(&state, JobKind::UiCase, id).await
}

/// POST /performance_tests/{id}/run
pub async fn run_performance_test(
    State(state): State<AppState>,
    Path(id): Path<DefinitionId>,
) -> ApiResult<(StatusCode, Json<Submitted>)> {
    submit(&state, JobKind::Performance, id).await
}

async fn submit(
    state: &AppState,
    kind: JobKind,
    definition_id: DefinitionId,
) -> ApiResult<(StatusCode, Json<Submitted>)> {
    tracing::info!("Submitting {} job for definition {}", kind, definition_id);

    let handle = state.scheduler.submit(kind, definition_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Submitted {
            handle,
            state: JobState::Pending,
        }),
    ))
}

// =============================================================================
// Lifecycle Endpoints
// =============================================================================

/// GET /tasks/{handle}
/// Poll the status of a job
///
/// Unknown and expired handles read as PENDING rather than 404.
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(handle): Path<JobHandle>,
) -> ApiResult<Json<TaskStatus>> {
    tracing::debug!("Getting status of task: {}", handle);

    let status = state.scheduler.status(handle).await?;
    Ok(Json(status))
}

/// POST /tasks/{handle}/cancel
/// Cancel a job that is still queued
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(handle): Path<JobHandle>,
) -> ApiResult<Json<TaskStatus>> {
    tracing::info!("Cancelling task: {}", handle);

    let status = state.scheduler.cancel(handle).await?;
    Ok(Json(status))
}

/// GET /tasks/{handle}/report
/// Fetch the report written for a finished job
pub async fn get_task_report(
    State(state): State<AppState>,
    Path(handle): Path<JobHandle>,
) -> ApiResult<Json<TestReport>> {
    tracing::debug!("Getting report of task: {}", handle);

    let report = state
        .reports
        .find_by_handle(handle)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No report for task {}", handle)))?;

    Ok(Json(report))
}
