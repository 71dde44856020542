//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod report;
pub mod task;

use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use probe_runner::Scheduler;
use probe_runner::store::ReportStore;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub reports: Arc<dyn ReportStore>,
}

/// Create the main API router with all endpoints
///
/// Screenshots and load-test HTML reports under `artifact_dir` are served
/// read-only at `/artifacts`.
pub fn create_router(state: AppState, artifact_dir: &Path) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Submission endpoints
        .route("/tasks", post(task::submit_task))
        .route("/api_tests/cases/{id}/run", post(task::run_api_case))
        .route("/api_tests/suites/{id}/run", post(task::run_api_suite))
        .route("/ui_tests/cases/{id}/run", post(task::run_ui_case))
        .route(
            "/performance_tests/{id}/run",
            post(task::run_performance_test),
        )
        // Task endpoints
        .route("/tasks/{handle}", get(task::get_task_status))
        .route("/tasks/{handle}/cancel", post(task::cancel_task))
        .route("/tasks/{handle}/report", get(task::get_task_report))
        // Report endpoints
        .route("/reports", get(report::list_reports))
        .route("/reports/{id}", get(report::get_report))
        .nest_service("/artifacts", ServeDir::new(artifact_dir))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
