//! Worker pool
//!
//! A single dispatcher drains the queue. It takes a worker permit before
//! receiving the next job, so jobs stay in the bounded queue (and count against
//! its capacity) until a worker is actually free.

use probe_core::domain::definition::JobDefinition;
use probe_core::domain::job::JobHandle;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, info, warn};

use crate::scheduler::worker::Worker;

/// A submitted job waiting for a worker
pub(crate) struct QueuedJob {
    pub handle: JobHandle,
    pub definition: JobDefinition,
}

pub(crate) struct WorkerPool {
    concurrency: usize,
    semaphore: Arc<Semaphore>,
    worker: Arc<Worker>,
}

impl WorkerPool {
    pub fn new(concurrency: usize, worker: Worker) -> Self {
        Self {
            concurrency,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            worker: Arc::new(worker),
        }
    }

    /// Runs until the queue is closed and drained, then waits for in-flight jobs
    pub async fn run(self, mut queue: mpsc::Receiver<QueuedJob>) {
        info!("Worker pool started with {} worker(s)", self.concurrency);

        loop {
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                break;
            };
            let Some(job) = queue.recv().await else {
                break;
            };

            debug!("Dispatching job {}", job.handle);
            self.spawn_job_task(job, permit);
        }

        debug!("Queue closed, waiting for in-flight jobs");
        if let Err(e) = self.semaphore.acquire_many(self.concurrency as u32).await {
            warn!("Failed to wait for in-flight jobs: {}", e);
        }

        info!("Worker pool stopped");
    }

    /// Spawns a task to execute a single job
    fn spawn_job_task(&self, job: QueuedJob, permit: OwnedSemaphorePermit) {
        let worker = Arc::clone(&self.worker);

        tokio::spawn(async move {
            worker.run(job).await;
            // Permit is released when dropped
            drop(permit);
        });
    }
}
