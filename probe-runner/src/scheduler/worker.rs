//! Job worker
//!
//! Executes one dequeued job: claims it, runs the executor in an isolated task
//! so a panic cannot take the worker down, records the terminal state and
//! writes the test report.

use chrono::{DateTime, Utc};
use probe_core::domain::definition::JobDefinition;
use probe_core::domain::job::JobHandle;
use probe_core::domain::outcome::{
    ApiCaseResult, ExecutionOutcome, OutcomePayload, PerformanceResult, SuiteResult, UiCaseResult,
};
use probe_core::domain::task::StateUpdate;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::scheduler::pool::QueuedJob;
use crate::service::{JobExecutor, ProgressReporter, ReportWriter, StoreProgressReporter};
use crate::store::StateStore;

pub const INTERNAL_ERROR_MESSAGE: &str = "internal error: job execution panicked";

/// Backoff for terminal state writes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

pub(crate) struct Worker {
    states: Arc<dyn StateStore>,
    reports: ReportWriter,
    executor: Arc<dyn JobExecutor>,
    retry: RetryPolicy,
}

impl Worker {
    pub fn new(
        states: Arc<dyn StateStore>,
        reports: ReportWriter,
        executor: Arc<dyn JobExecutor>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            states,
            reports,
            executor,
            retry,
        }
    }

    pub async fn run(&self, job: QueuedJob) {
        let QueuedJob { handle, definition } = job;

        match self.states.apply(handle, StateUpdate::Started).await {
            Ok(_) => {}
            Err(StoreError::InvalidTransition(e)) => {
                info!("Skipping job {}: {}", handle, e);
                return;
            }
            Err(e) => {
                error!("Failed to claim job {}: {}", handle, e);
                let outcome = ExecutionOutcome::failed(
                    0.0,
                    empty_payload(&definition),
                    format!("Failed to start job: {}", e),
                );
                self.finish(handle, &definition, outcome, Utc::now()).await;
                return;
            }
        }

        info!("Starting execution of job {}", handle);
        let start_time = Utc::now();
        let started = Instant::now();

        let executor = Arc::clone(&self.executor);
        let progress: Arc<dyn ProgressReporter> =
            Arc::new(StoreProgressReporter::new(Arc::clone(&self.states)));
        let task_definition = definition.clone();

        let execution = tokio::spawn(async move {
            executor
                .execute(handle, &task_definition, progress.as_ref())
                .await
        });

        let outcome = match execution.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Job {} task panicked: {}", handle, e);
                ExecutionOutcome::failed(
                    started.elapsed().as_secs_f64(),
                    empty_payload(&definition),
                    INTERNAL_ERROR_MESSAGE,
                )
            }
        };

        self.finish(handle, &definition, outcome, start_time).await;
    }

    /// Records the terminal state, then the report for this attempt
    async fn finish(
        &self,
        handle: JobHandle,
        definition: &JobDefinition,
        outcome: ExecutionOutcome,
        start_time: DateTime<Utc>,
    ) {
        let update = if outcome.success {
            StateUpdate::Succeeded(outcome.clone())
        } else {
            StateUpdate::Failed {
                error: outcome
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Execution failed".to_string()),
                outcome: Some(outcome.clone()),
            }
        };

        self.write_terminal(handle, update).await;
        self.reports
            .write(handle, definition, &outcome, start_time)
            .await;
    }

    /// Records a terminal state, retrying transient store failures with backoff
    async fn write_terminal(&self, handle: JobHandle, update: StateUpdate) {
        let mut attempt = 0;
        let mut delay = self.retry.initial_delay;

        loop {
            attempt += 1;

            match self.states.apply(handle, update.clone()).await {
                Ok(record) => {
                    info!("Job {} completed with state {}", handle, record.state);
                    return;
                }
                Err(StoreError::InvalidTransition(e)) => {
                    warn!("Final state for job {} rejected: {}", handle, e);
                    return;
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        error!(
                            "Failed to record final state for job {} after {} attempts: {}",
                            handle, attempt, e
                        );
                        return;
                    }

                    warn!(
                        "Failed to record final state for job {} (attempt {}/{}): {}. Retrying in {:?}",
                        handle, attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.retry.max_delay);
                }
            }
        }
    }
}

/// Payload used when execution produced nothing
pub(crate) fn empty_payload(definition: &JobDefinition) -> OutcomePayload {
    match definition {
        JobDefinition::ApiCase(_) => OutcomePayload::ApiCase(ApiCaseResult::default()),
        JobDefinition::ApiSuite(suite) => OutcomePayload::ApiSuite(SuiteResult {
            suite_id: suite.id,
            suite_name: suite.name.clone(),
            total_cases: suite.case_ids.len(),
            passed_cases: 0,
            pass_rate: 0.0,
            results: Vec::new(),
        }),
        JobDefinition::UiCase(_) => OutcomePayload::UiCase(UiCaseResult::default()),
        JobDefinition::Performance(_) => {
            OutcomePayload::Performance(PerformanceResult::default())
        }
    }
}
