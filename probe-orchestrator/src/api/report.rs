//! Report API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use probe_core::domain::report::TestReport;
use probe_core::dto::report::ReportFilter;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /reports
/// List reports, newest first
///
/// Query parameters:
/// - `project_id` (optional): Only reports of this project
/// - `kind` (optional): Only reports of this job kind
pub async fn list_reports(
    State(state): State<AppState>,
    Query(filter): Query<ReportFilter>,
) -> ApiResult<Json<Vec<TestReport>>> {
    tracing::debug!("Listing reports: {:?}", filter);

    let reports = state.reports.list_reports(&filter).await?;
    Ok(Json(reports))
}

/// GET /reports/{id}
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<TestReport>> {
    let report = state
        .reports
        .get_report(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Report {} not found", id)))?;

    Ok(Json(report))
}
