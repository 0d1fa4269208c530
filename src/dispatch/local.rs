use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{Job, JobRunner};

/// In-process deferred task executor.
///
/// Jobs go through an unbounded channel to a worker task that spawns each
/// one with retry. [`submit`](Self::submit) hands the job back when the
/// executor is closed or was never started.
#[derive(Clone)]
pub struct LocalExecutor {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Job>>>>,
}

impl LocalExecutor {
    /// Start the worker on the current runtime. Without a runtime the
    /// executor starts closed.
    pub fn start(runner: Arc<JobRunner>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = match Handle::try_current() {
            Ok(handle) => {
                runner.spawn_on(drain(rx, runner.clone(), handle.clone()), &handle);
                Some(tx)
            }
            Err(_) => {
                warn!("No async runtime, local executor disabled");
                None
            }
        };
        Self {
            sender: Arc::new(Mutex::new(sender)),
        }
    }

    pub fn submit(&self, job: Job) -> Result<(), Job> {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    /// Stop accepting jobs. Jobs already queued still run; await
    /// [`JobRunner::wait_idle`] to let them finish.
    pub fn close(&self) {
        self.sender.lock().take();
    }

    pub fn is_open(&self) -> bool {
        self.sender.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

async fn drain(mut rx: mpsc::UnboundedReceiver<Job>, runner: Arc<JobRunner>, handle: Handle) {
    while let Some(job) = rx.recv().await {
        debug!(job = job.name(), rfp_id = %job.rfp_id(), "Running job locally");
        let worker = runner.clone();
        runner.spawn_on(async move { worker.run_with_retry(job).await }, &handle);
    }
    debug!("Local executor drained");
}

/// Last link of the fallback chain: spawn on the current runtime, or run one
/// attempt in place when there is none.
pub(crate) fn run_direct(runner: &Arc<JobRunner>, job: Job) {
    match Handle::try_current() {
        Ok(handle) => {
            let worker = runner.clone();
            runner.spawn_on(async move { worker.run_with_retry(job).await }, &handle);
        }
        Err(_) => {
            warn!(job = job.name(), rfp_id = %job.rfp_id(), "No runtime, running job in place");
            if let Err(e) = futures::executor::block_on(runner.run(&job)) {
                error!(job = job.name(), rfp_id = %job.rfp_id(), error = %e, "Job failed");
            }
        }
    }
}

/// Hand a job to the local executor, falling back to [`run_direct`].
pub(crate) fn run_locally(local: &LocalExecutor, runner: &Arc<JobRunner>, job: Job) {
    if let Err(job) = local.submit(job) {
        warn!(job = job.name(), rfp_id = %job.rfp_id(), "Local executor unavailable, running directly");
        run_direct(runner, job);
    }
}
