use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::local::run_locally;
use super::{Dispatcher, Job, JobQueue, JobRunner, LocalExecutor, QueuedJob};
use crate::domain::DomainEvent;

const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(2);

/// Pushes jobs to a broker for a [`QueueWorker`](super::QueueWorker) to run.
///
/// The enqueue itself happens on a spawned task. If the broker refuses or
/// times out the job runs on the local executor instead.
pub struct QueueBackedDispatcher {
    queue: Arc<dyn JobQueue>,
    runner: Arc<JobRunner>,
    local: LocalExecutor,
}

impl QueueBackedDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, runner: Arc<JobRunner>) -> Self {
        let local = LocalExecutor::start(runner.clone());
        Self {
            queue,
            runner,
            local,
        }
    }

    pub fn with_executor(
        queue: Arc<dyn JobQueue>,
        runner: Arc<JobRunner>,
        local: LocalExecutor,
    ) -> Self {
        Self {
            queue,
            runner,
            local,
        }
    }
}

impl Dispatcher for QueueBackedDispatcher {
    fn dispatch(&self, event: DomainEvent) {
        for job in Job::for_event(&event) {
            let Ok(handle) = Handle::try_current() else {
                run_locally(&self.local, &self.runner, job);
                continue;
            };

            let queue = self.queue.clone();
            let runner = self.runner.clone();
            let local = self.local.clone();
            self.runner.spawn_on(async move {
                let envelope = QueuedJob::new(job);
                let outcome = tokio::time::timeout(ENQUEUE_TIMEOUT, queue.enqueue(&envelope)).await;
                match outcome {
                    Ok(Ok(())) => {
                        debug!(job = envelope.job.name(), rfp_id = %envelope.job.rfp_id(), job_id = %envelope.id, "Job enqueued");
                    }
                    Ok(Err(e)) => {
                        warn!(job = envelope.job.name(), rfp_id = %envelope.job.rfp_id(), error = %e, "Enqueue failed, falling back to local execution");
                        run_locally(&local, &runner, envelope.job);
                    }
                    Err(_) => {
                        warn!(job = envelope.job.name(), rfp_id = %envelope.job.rfp_id(), "Enqueue timed out, falling back to local execution");
                        run_locally(&local, &runner, envelope.job);
                    }
                }
            }, &handle);
        }
    }
}
