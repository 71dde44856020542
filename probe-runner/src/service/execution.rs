//! Execution service
//!
//! Dispatches a resolved definition to the adapter for its kind. This service
//! contains no lifecycle bookkeeping; the scheduler owns state transitions.

use async_trait::async_trait;
use probe_core::domain::definition::JobDefinition;
use probe_core::domain::job::JobHandle;
use probe_core::domain::outcome::ExecutionOutcome;
use tracing::info;

use crate::adapters::{ApiCaseAdapter, ApiSuiteAdapter, PerformanceAdapter, UiCaseAdapter};
use crate::config::RunnerConfig;
use crate::service::ProgressReporter;

/// Service trait for executing one job
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Executes a job to completion
    ///
    /// # Arguments
    /// * `handle` - The job handle, used for progress and artifact naming
    /// * `definition` - The fully resolved definition
    /// * `progress` - Sink for progress updates
    ///
    /// # Returns
    /// The normalized outcome; execution failures are reported through it
    async fn execute(
        &self,
        handle: JobHandle,
        definition: &JobDefinition,
        progress: &dyn ProgressReporter,
    ) -> ExecutionOutcome;
}

/// Standard implementation of JobExecutor backed by the kind adapters
pub struct StandardJobExecutor {
    api: ApiCaseAdapter,
    suite: ApiSuiteAdapter,
    ui: UiCaseAdapter,
    performance: PerformanceAdapter,
}

impl StandardJobExecutor {
    /// Creates the executor and its adapters
    pub fn new(config: &RunnerConfig) -> anyhow::Result<Self> {
        let api = ApiCaseAdapter::new(config.api_request_timeout)?;

        Ok(Self {
            suite: ApiSuiteAdapter::new(api.clone()),
            api,
            ui: UiCaseAdapter::new(config),
            performance: PerformanceAdapter::new(config),
        })
    }
}

#[async_trait]
impl JobExecutor for StandardJobExecutor {
    async fn execute(
        &self,
        handle: JobHandle,
        definition: &JobDefinition,
        progress: &dyn ProgressReporter,
    ) -> ExecutionOutcome {
        info!(
            "Executing {} '{}' as job {}",
            definition.kind(),
            definition.name(),
            handle
        );

        let outcome = match definition {
            JobDefinition::ApiCase(case) => self.api.run(handle, case, progress).await,
            JobDefinition::ApiSuite(suite) => self.suite.run(handle, suite, progress).await,
            JobDefinition::UiCase(case) => self.ui.run(handle, case, progress).await,
            JobDefinition::Performance(test) => {
                self.performance.run(handle, test, progress).await
            }
        };

        progress.report(handle, 100, "done", "execution finished").await;

        outcome
    }
}
