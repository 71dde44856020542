//! Submission, status and cancellation
//!
//! The [`Scheduler`] is the entry point used by the HTTP layer. Submissions are
//! validated against the definition store before a handle is allocated, then
//! enqueued without blocking; a full queue is reported to the caller.

use probe_core::domain::definition::{DefinitionId, JobDefinition};
use probe_core::domain::job::{JobHandle, JobKind};
use probe_core::domain::task::{StateUpdate, TaskRecord};
use probe_core::dto::task::TaskStatus;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapters::PerformanceAdapter;
use crate::config::RunnerConfig;
use crate::error::{CancelError, StoreError, SubmitError};
use crate::scheduler::pool::{QueuedJob, WorkerPool};
use crate::scheduler::worker::{RetryPolicy, Worker};
use crate::service::{JobExecutor, ReportWriter};
use crate::store::{DefinitionStore, ReportStore, StateStore};

/// Job scheduler with a bounded queue and a fixed worker pool
pub struct Scheduler {
    sender: RwLock<Option<mpsc::Sender<QueuedJob>>>,
    queue_capacity: usize,
    definitions: Arc<dyn DefinitionStore>,
    states: Arc<dyn StateStore>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Starts the worker pool and returns a scheduler accepting submissions
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: &RunnerConfig,
        definitions: Arc<dyn DefinitionStore>,
        states: Arc<dyn StateStore>,
        reports: Arc<dyn ReportStore>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self::start_with_retry(
            config,
            definitions,
            states,
            reports,
            executor,
            RetryPolicy::default(),
        )
    }

    /// Like [`Scheduler::start`] with a custom terminal-write retry policy
    pub fn start_with_retry(
        config: &RunnerConfig,
        definitions: Arc<dyn DefinitionStore>,
        states: Arc<dyn StateStore>,
        reports: Arc<dyn ReportStore>,
        executor: Arc<dyn JobExecutor>,
        retry: RetryPolicy,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);

        let worker = Worker::new(states.clone(), ReportWriter::new(reports), executor, retry);
        let pool = WorkerPool::new(config.worker_concurrency, worker);
        let dispatcher = tokio::spawn(pool.run(receiver));

        info!(
            "Scheduler started ({} workers, queue capacity {})",
            config.worker_concurrency, config.queue_capacity
        );

        Self {
            sender: RwLock::new(Some(sender)),
            queue_capacity: config.queue_capacity,
            definitions,
            states,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Submits a job for asynchronous execution
    ///
    /// # Returns
    /// The handle of the queued job, whose state is PENDING
    ///
    /// # Errors
    /// * `DefinitionNotFound` - no definition of that kind and id; no handle is allocated
    /// * `InvalidDefinition` - the definition cannot run (e.g., missing test plan)
    /// * `CapacityExceeded` - the queue is full
    /// * `ShuttingDown` - the scheduler no longer accepts work
    pub async fn submit(
        &self,
        kind: JobKind,
        definition_id: DefinitionId,
    ) -> Result<JobHandle, SubmitError> {
        let sender = self
            .sender
            .read()
            .await
            .clone()
            .ok_or(SubmitError::ShuttingDown)?;

        let definition = self
            .definitions
            .get_definition(kind, definition_id)
            .await?
            .ok_or(SubmitError::DefinitionNotFound {
                kind,
                id: definition_id,
            })?;

        validate(&definition).await?;

        let slot = sender.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => {
                warn!("Rejecting {} submission: queue is full", kind);
                SubmitError::CapacityExceeded {
                    capacity: self.queue_capacity,
                }
            }
            TrySendError::Closed(()) => SubmitError::ShuttingDown,
        })?;

        let handle = JobHandle::new();
        self.states
            .insert(TaskRecord::pending(handle, kind, definition_id))
            .await?;
        slot.send(QueuedJob { handle, definition });

        info!(
            "Queued job {} ({} definition {})",
            handle, kind, definition_id
        );

        Ok(handle)
    }

    /// Reads the current status of a job
    ///
    /// Unknown and expired handles read as PENDING with a default message.
    pub async fn status(&self, handle: JobHandle) -> Result<TaskStatus, StoreError> {
        let record = self.states.get(handle).await?;
        Ok(TaskStatus::from_record(handle, record.as_ref()))
    }

    /// Cancels a job that no worker has picked up yet
    pub async fn cancel(&self, handle: JobHandle) -> Result<TaskStatus, CancelError> {
        match self.states.apply(handle, StateUpdate::Cancelled).await {
            Ok(record) => {
                info!("Cancelled job {}", handle);
                Ok(TaskStatus::from_record(handle, Some(&record)))
            }
            Err(StoreError::TaskNotFound(_)) => Err(CancelError::NotFound(handle)),
            Err(StoreError::InvalidTransition(e)) if e.from.is_terminal() => {
                Err(CancelError::AlreadyFinished {
                    handle,
                    state: e.from,
                })
            }
            Err(StoreError::InvalidTransition(e)) => Err(CancelError::AlreadyRunning {
                handle,
                state: e.from,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Stops accepting submissions, runs what is queued and waits for all workers
    pub async fn shutdown(&self) {
        if self.sender.write().await.take().is_none() {
            return;
        }
        info!("Scheduler shutting down, draining queued jobs");

        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            if let Err(e) = dispatcher.await {
                warn!("Dispatcher task panicked: {}", e);
            }
        }

        info!("Scheduler stopped");
    }
}

async fn validate(definition: &JobDefinition) -> Result<(), SubmitError> {
    match definition {
        JobDefinition::Performance(test) => PerformanceAdapter::validate(test)
            .await
            .map_err(SubmitError::InvalidDefinition),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::worker::INTERNAL_ERROR_MESSAGE;
    use crate::service::ProgressReporter;
    use crate::store::{InMemoryDefinitionStore, InMemoryReportStore, InMemoryStateStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use probe_core::domain::definition::{ApiCaseDefinition, PerformanceDefinition};
    use probe_core::domain::job::JobState;
    use probe_core::domain::outcome::{ApiCaseResult, ExecutionOutcome, OutcomePayload};
    use probe_core::domain::report::{NewTestReport, TestReport};
    use probe_core::dto::report::ReportFilter;
    use probe_core::dto::task::DEFAULT_PENDING_MESSAGE;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct TestExecutor {
        gate: Option<Arc<Semaphore>>,
        delay: Duration,
        panics: bool,
        calls: Mutex<HashMap<JobHandle, usize>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl TestExecutor {
        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Default::default()
            }
        }

        fn delayed(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        async fn calls_for(&self, handle: JobHandle) -> usize {
            self.calls.lock().await.get(&handle).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl JobExecutor for TestExecutor {
        async fn execute(
            &self,
            handle: JobHandle,
            _definition: &JobDefinition,
            progress: &dyn ProgressReporter,
        ) -> ExecutionOutcome {
            *self.calls.lock().await.entry(handle).or_default() += 1;
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);

            progress.report(handle, 50, "running", "halfway").await;

            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.panics {
                panic!("executor blew up");
            }

            ExecutionOutcome::succeeded(
                self.delay.as_secs_f64(),
                OutcomePayload::ApiCase(ApiCaseResult::default()),
            )
        }
    }

    /// Fails the first N writes matching `fails_on`
    struct FlakyStateStore {
        inner: InMemoryStateStore,
        fails_on: fn(&StateUpdate) -> bool,
        failures_left: AtomicU32,
    }

    impl FlakyStateStore {
        fn new(fails_on: fn(&StateUpdate) -> bool, failures: u32) -> Self {
            Self {
                inner: InMemoryStateStore::new(chrono::Duration::hours(1)),
                fails_on,
                failures_left: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait]
    impl StateStore for FlakyStateStore {
        async fn insert(&self, record: TaskRecord) -> Result<(), StoreError> {
            self.inner.insert(record).await
        }

        async fn get(&self, handle: JobHandle) -> Result<Option<TaskRecord>, StoreError> {
            self.inner.get(handle).await
        }

        async fn apply(
            &self,
            handle: JobHandle,
            update: StateUpdate,
        ) -> Result<TaskRecord, StoreError> {
            if (self.fails_on)(&update)
                && self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.apply(handle, update).await
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
            self.inner.purge_expired(now).await
        }

        async fn list_unfinished(&self) -> Result<Vec<TaskRecord>, StoreError> {
            self.inner.list_unfinished().await
        }
    }

    /// Report store whose writes always fail
    #[derive(Default)]
    struct UnavailableReportStore {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ReportStore for UnavailableReportStore {
        async fn save_report(&self, _report: NewTestReport) -> Result<TestReport, StoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("report database down".to_string()))
        }

        async fn list_reports(
            &self,
            _filter: &ReportFilter,
        ) -> Result<Vec<TestReport>, StoreError> {
            Ok(Vec::new())
        }

        async fn get_report(&self, _id: i64) -> Result<Option<TestReport>, StoreError> {
            Ok(None)
        }

        async fn find_by_handle(
            &self,
            _handle: JobHandle,
        ) -> Result<Option<TestReport>, StoreError> {
            Ok(None)
        }
    }

    struct Harness {
        scheduler: Scheduler,
        states: Arc<dyn StateStore>,
        reports: Arc<dyn ReportStore>,
        executor: Arc<TestExecutor>,
    }

    fn definitions() -> Arc<InMemoryDefinitionStore> {
        Arc::new(
            InMemoryDefinitionStore::new()
                .with_api_case(ApiCaseDefinition {
                    id: 1,
                    project_id: 7,
                    name: "ping".to_string(),
                    method: "GET".to_string(),
                    url: "http://localhost/ping".to_string(),
                    headers: HashMap::new(),
                    params: HashMap::new(),
                    body: None,
                    assertions: Default::default(),
                })
                .with_performance_test(PerformanceDefinition {
                    id: 5,
                    project_id: 7,
                    name: "soak".to_string(),
                    plan_path: None,
                }),
        )
    }

    fn harness_with(
        concurrency: usize,
        capacity: usize,
        executor: TestExecutor,
        states: Arc<dyn StateStore>,
        reports: Arc<dyn ReportStore>,
    ) -> Harness {
        let config = RunnerConfig {
            worker_concurrency: concurrency,
            queue_capacity: capacity,
            ..RunnerConfig::default()
        };
        let executor = Arc::new(executor);
        let retry = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        };

        let scheduler = Scheduler::start_with_retry(
            &config,
            definitions(),
            states.clone(),
            reports.clone(),
            executor.clone(),
            retry,
        );

        Harness {
            scheduler,
            states,
            reports,
            executor,
        }
    }

    fn harness(concurrency: usize, capacity: usize, executor: TestExecutor) -> Harness {
        let states = Arc::new(InMemoryStateStore::new(chrono::Duration::hours(1)));
        harness_with(
            concurrency,
            capacity,
            executor,
            states,
            Arc::new(InMemoryReportStore::new()),
        )
    }

    async fn wait_for(
        scheduler: &Scheduler,
        handle: JobHandle,
        done: impl Fn(JobState) -> bool,
    ) -> TaskStatus {
        for _ in 0..300 {
            let status = scheduler.status(handle).await.unwrap();
            if done(status.state) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not reach the expected state", handle);
    }

    async fn wait_terminal(scheduler: &Scheduler, handle: JobHandle) -> TaskStatus {
        wait_for(scheduler, handle, |state| state.is_terminal()).await
    }

    #[tokio::test]
    async fn test_unknown_definition_allocates_nothing() {
        let h = harness(1, 4, TestExecutor::default());

        let err = h.scheduler.submit(JobKind::ApiCase, 404).await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::DefinitionNotFound { kind: JobKind::ApiCase, id: 404 }
        ));

        // Same id exists as an API case but not as a UI case
        let err = h.scheduler.submit(JobKind::UiCase, 1).await.unwrap_err();
        assert!(matches!(err, SubmitError::DefinitionNotFound { .. }));
        assert_eq!(h.executor.calls.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn test_performance_without_plan_is_rejected() {
        let h = harness(1, 4, TestExecutor::default());

        let err = h
            .scheduler
            .submit(JobKind::Performance, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidDefinition(_)));
    }

    #[tokio::test]
    async fn test_job_runs_once_and_writes_one_report() {
        let h = harness(2, 4, TestExecutor::default());

        let handle = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap();
        let status = wait_terminal(&h.scheduler, handle).await;

        assert_eq!(status.state, JobState::Success);
        assert!(status.result.is_some());
        assert!(status.error.is_none());
        assert_eq!(h.executor.calls_for(handle).await, 1);

        // The report is written right after the terminal state
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reports = h.reports.list_reports(&ReportFilter::default()).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].handle, handle);
        assert_eq!(reports[0].project_id, 7);
        assert_eq!(reports[0].pass_rate, 100.0);
    }

    #[tokio::test]
    async fn test_unknown_handle_reads_as_pending() {
        let h = harness(1, 4, TestExecutor::default());

        let status = h.scheduler.status(JobHandle::new()).await.unwrap();
        assert_eq!(status.state, JobState::Pending);
        assert_eq!(status.status_message.as_deref(), Some(DEFAULT_PENDING_MESSAGE));
        assert!(status.result.is_none());
    }

    #[tokio::test]
    async fn test_full_queue_rejects_submission() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness(1, 1, TestExecutor::gated(gate.clone()));

        let running = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap();
        wait_for(&h.scheduler, running, |s| s != JobState::Pending).await;

        let queued = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap();
        let err = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap_err();
        assert!(matches!(err, SubmitError::CapacityExceeded { capacity: 1 }));

        gate.add_permits(2);
        assert_eq!(wait_terminal(&h.scheduler, running).await.state, JobState::Success);
        assert_eq!(wait_terminal(&h.scheduler, queued).await.state, JobState::Success);
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness(1, 4, TestExecutor::gated(gate.clone()));

        let running = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap();
        wait_for(&h.scheduler, running, |s| s != JobState::Pending).await;
        let waiting = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap();

        let cancelled = h.scheduler.cancel(waiting).await.unwrap();
        assert_eq!(cancelled.state, JobState::Cancelled);

        let err = h.scheduler.cancel(running).await.unwrap_err();
        assert!(matches!(err, CancelError::AlreadyRunning { .. }));

        let err = h.scheduler.cancel(JobHandle::new()).await.unwrap_err();
        assert!(matches!(err, CancelError::NotFound(_)));

        gate.add_permits(2);
        wait_terminal(&h.scheduler, running).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The cancelled job never reached a worker and has no report
        assert_eq!(h.executor.calls_for(waiting).await, 0);
        assert_eq!(
            h.scheduler.status(waiting).await.unwrap().state,
            JobState::Cancelled
        );
        assert!(h.reports.find_by_handle(waiting).await.unwrap().is_none());

        let err = h.scheduler.cancel(running).await.unwrap_err();
        assert!(matches!(err, CancelError::AlreadyFinished { state: JobState::Success, .. }));
    }

    #[tokio::test]
    async fn test_executor_panic_fails_job_and_pool_survives() {
        let executor = TestExecutor {
            panics: true,
            ..Default::default()
        };
        let h = harness(1, 4, executor);

        let first = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap();
        let second = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap();

        let status = wait_terminal(&h.scheduler, first).await;
        assert_eq!(status.state, JobState::Failure);
        assert_eq!(status.error.as_deref(), Some(INTERNAL_ERROR_MESSAGE));

        let status = wait_terminal(&h.scheduler, second).await;
        assert_eq!(status.state, JobState::Failure);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = h.reports.find_by_handle(first).await.unwrap().unwrap();
        assert_eq!(report.pass_rate, 0.0);
    }

    #[tokio::test]
    async fn test_terminal_write_is_retried() {
        let states = Arc::new(FlakyStateStore::new(
            |update| matches!(update, StateUpdate::Succeeded(_)),
            2,
        ));
        let h = harness_with(
            1,
            4,
            TestExecutor::default(),
            states,
            Arc::new(InMemoryReportStore::new()),
        );

        let handle = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap();
        let status = wait_terminal(&h.scheduler, handle).await;

        assert_eq!(status.state, JobState::Success);
        assert!(h.states.get(handle).await.unwrap().unwrap().finished_at.is_some());
    }

    #[tokio::test]
    async fn test_report_failure_keeps_success() {
        let reports = Arc::new(UnavailableReportStore::default());
        let states = Arc::new(InMemoryStateStore::new(chrono::Duration::hours(1)));
        let h = harness_with(1, 4, TestExecutor::default(), states, reports.clone());

        let handle = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap();
        wait_terminal(&h.scheduler, handle).await;

        for _ in 0..100 {
            if reports.attempts.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(reports.attempts.load(Ordering::SeqCst), 1);

        let status = h.scheduler.status(handle).await.unwrap();
        assert_eq!(status.state, JobState::Success);
        assert!(status.result.is_some());
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_failed_claim_still_writes_report() {
        let states = Arc::new(FlakyStateStore::new(
            |update| matches!(update, StateUpdate::Started),
            1,
        ));
        let h = harness_with(
            1,
            4,
            TestExecutor::default(),
            states,
            Arc::new(InMemoryReportStore::new()),
        );

        let handle = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap();
        let status = wait_terminal(&h.scheduler, handle).await;

        assert_eq!(status.state, JobState::Failure);
        assert!(status.error.unwrap().starts_with("Failed to start job"));
        assert_eq!(h.executor.calls_for(handle).await, 0);

        let mut report = None;
        for _ in 0..100 {
            report = h.reports.find_by_handle(handle).await.unwrap();
            if report.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let report = report.expect("report for the failed claim");
        assert_eq!(report.pass_rate, 0.0);
        assert_eq!(report.project_id, 7);
    }

    #[tokio::test]
    async fn test_worker_pool_respects_concurrency() {
        let h = harness(2, 16, TestExecutor::delayed(Duration::from_millis(50)));

        let mut handles = Vec::new();
        for _ in 0..6 {
            handles.push(h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap());
        }
        for handle in &handles {
            wait_terminal(&h.scheduler, *handle).await;
        }

        assert!(h.executor.max_active.load(Ordering::SeqCst) <= 2);
        for handle in &handles {
            assert_eq!(h.executor.calls_for(*handle).await, 1);
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let h = harness(1, 8, TestExecutor::delayed(Duration::from_millis(20)));

        let mut handles = Vec::new();
        for _ in 0..3 {
            handles.push(h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap());
        }

        h.scheduler.shutdown().await;

        for handle in &handles {
            let status = h.scheduler.status(*handle).await.unwrap();
            assert_eq!(status.state, JobState::Success);
        }

        let err = h.scheduler.submit(JobKind::ApiCase, 1).await.unwrap_err();
        assert!(matches!(err, SubmitError::ShuttingDown));
    }
}
