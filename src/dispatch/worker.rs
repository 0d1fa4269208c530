use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{JobQueue, JobRunner, QueuedJob};

const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Consumes a [`JobQueue`] until told to stop.
///
/// A failed job is re-enqueued with its attempt counter bumped after the
/// policy's delay; once it has used every attempt it goes to the dead-letter
/// list.
pub struct QueueWorker {
    queue: Arc<dyn JobQueue>,
    runner: Arc<JobRunner>,
    poll_timeout: Duration,
}

impl QueueWorker {
    pub fn new(queue: Arc<dyn JobQueue>, runner: Arc<JobRunner>) -> Self {
        Self {
            queue,
            runner,
            poll_timeout: POLL_TIMEOUT,
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!("Queue worker started");
        while !*shutdown.borrow() {
            match self.queue.dequeue(self.poll_timeout).await {
                Ok(Some(queued)) => self.process(queued).await,
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Dequeue failed");
                    tokio::time::sleep(self.runner.policy().initial_interval).await;
                }
            }
        }
        info!("Queue worker stopped");
    }

    /// Run one delivery of a job and schedule what happens next.
    pub async fn process(&self, queued: QueuedJob) {
        let name = queued.job.name();
        let rfp_id = queued.job.rfp_id();
        let policy = self.runner.policy();

        let err = match self.runner.run(&queued.job).await {
            Ok(()) => {
                debug!(job = name, rfp_id = %rfp_id, attempt = queued.attempt, "Job completed");
                return;
            }
            Err(e) => e,
        };

        if !err.is_retryable() || queued.attempt >= policy.max_attempts {
            error!(job = name, rfp_id = %rfp_id, attempt = queued.attempt, error = %err, "Job failed permanently, dead-lettering");
            if let Err(e) = self.queue.dead_letter(&queued).await {
                error!(job = name, rfp_id = %rfp_id, error = %e, "Dead-letter failed");
            }
            return;
        }

        let delay = policy.delay_for(queued.attempt);
        warn!(job = name, rfp_id = %rfp_id, attempt = queued.attempt, delay_ms = delay.as_millis() as u64, error = %err, "Job failed, re-enqueueing");

        let queue = self.queue.clone();
        let runner = self.runner.clone();
        let retry = queued.next_attempt();
        self.runner.spawn_on(
            async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = queue.enqueue(&retry).await {
                    warn!(job = retry.job.name(), rfp_id = %retry.job.rfp_id(), error = %e, "Re-enqueue failed, running in process");
                    runner.run_with_retry(retry.job).await;
                }
            },
            &Handle::current(),
        );
    }
}
