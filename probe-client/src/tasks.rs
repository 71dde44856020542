//! Task-related API endpoints

use std::time::{Duration, Instant};

use probe_core::domain::definition::DefinitionId;
use probe_core::domain::job::{JobHandle, JobKind};
use probe_core::dto::task::{SubmitJob, Submitted, TaskStatus};

use crate::OrchestratorClient;
use crate::error::{ClientError, Result};

impl OrchestratorClient {
    // =============================================================================
    // Task Lifecycle
    // =============================================================================

    /// Submit a test job
    ///
    /// # Arguments
    /// * `kind` - Which kind of test to run
    /// * `definition_id` - Id of the test definition of that kind
    ///
    /// # Returns
    /// The handle to poll, with the job in PENDING state
    pub async fn submit(&self, kind: JobKind, definition_id: DefinitionId) -> Result<Submitted> {
        let url = format!("{}/tasks", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SubmitJob {
                kind,
                definition_id,
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get the current status of a task
    ///
    /// Handles the orchestrator does not know (or has expired) read as PENDING.
    pub async fn get_status(&self, handle: JobHandle) -> Result<TaskStatus> {
        let url = format!("{}/tasks/{}", self.base_url, handle);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Cancel a task that has not started yet
    ///
    /// Fails with status 409 once a worker picked the task up.
    pub async fn cancel(&self, handle: JobHandle) -> Result<TaskStatus> {
        let url = format!("{}/tasks/{}/cancel", self.base_url, handle);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Poll a task until it reaches a terminal state
    ///
    /// # Arguments
    /// * `handle` - The task to wait for
    /// * `poll_interval` - Delay between status requests
    /// * `timeout` - Give up after this long with `ClientError::Timeout`
    pub async fn wait_for_completion(
        &self,
        handle: JobHandle,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<TaskStatus> {
        let started = Instant::now();

        loop {
            let status = self.get_status(handle).await?;
            if status.state.is_terminal() {
                return Ok(status);
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(ClientError::Timeout { handle, waited });
            }

            tracing::debug!(
                "Task {} is {} ({}%)",
                handle,
                status.state,
                status.percent.unwrap_or(0)
            );
            tokio::time::sleep(poll_interval.min(timeout - waited)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode,
        routing::{get, post},
    };
    use probe_core::domain::job::JobState;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports SUCCESS after `polls_until_done` status requests
    #[derive(Clone)]
    struct Stub {
        polls: Arc<AtomicUsize>,
        polls_until_done: usize,
    }

    async fn status(State(stub): State<Stub>, Path(handle): Path<JobHandle>) -> Json<TaskStatus> {
        let seen = stub.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let state = if seen >= stub.polls_until_done {
            JobState::Success
        } else {
            JobState::Progress
        };

        Json(TaskStatus {
            handle,
            state,
            percent: Some(50),
            current_step: None,
            status_message: None,
            result: None,
            error: None,
        })
    }

    async fn submit(Json(req): Json<SubmitJob>) -> (StatusCode, Json<serde_json::Value>) {
        if req.definition_id == 404 {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "API_CASE definition 404 not found" })),
            );
        }
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "handle": JobHandle::new(), "state": "PENDING" })),
        )
    }

    async fn cancel() -> (StatusCode, Json<serde_json::Value>) {
        (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "already STARTED" })),
        )
    }

    async fn serve(polls_until_done: usize) -> (OrchestratorClient, Arc<AtomicUsize>) {
        let polls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/tasks", post(submit))
            .route("/tasks/{handle}", get(status))
            .route("/tasks/{handle}/cancel", post(cancel))
            .with_state(Stub {
                polls: polls.clone(),
                polls_until_done,
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (OrchestratorClient::new(format!("http://{}", addr)), polls)
    }

    #[tokio::test]
    async fn test_submit_returns_pending_handle() {
        let (client, _) = serve(1).await;
        let submitted = client.submit(JobKind::ApiCase, 1).await.unwrap();
        assert_eq!(submitted.state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_api_errors_carry_status_and_message() {
        let (client, _) = serve(1).await;

        let err = client.submit(JobKind::ApiCase, 404).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("definition 404 not found"));

        let err = client.cancel(JobHandle::new()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_wait_for_completion_polls_until_terminal() {
        let (client, polls) = serve(3).await;

        let status = client
            .wait_for_completion(
                JobHandle::new(),
                Duration::from_millis(5),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(status.state, JobState::Success);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_for_completion_times_out() {
        let (client, _) = serve(usize::MAX).await;
        let handle = JobHandle::new();

        let err = client
            .wait_for_completion(handle, Duration::from_millis(5), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Timeout { handle: h, .. } if h == handle));
    }
}
