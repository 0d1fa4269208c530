use std::sync::Arc;
use tracing::debug;

use super::local::run_locally;
use super::{Dispatcher, Job, JobRunner, LocalExecutor};
use crate::domain::DomainEvent;

/// Runs side effects in this process after the request returns.
pub struct InlineDispatcher {
    runner: Arc<JobRunner>,
    local: LocalExecutor,
}

impl InlineDispatcher {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        let local = LocalExecutor::start(runner.clone());
        Self { runner, local }
    }

    pub fn with_executor(runner: Arc<JobRunner>, local: LocalExecutor) -> Self {
        Self { runner, local }
    }

    pub fn executor(&self) -> &LocalExecutor {
        &self.local
    }
}

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, event: DomainEvent) {
        for job in Job::for_event(&event) {
            debug!(job = job.name(), rfp_id = %job.rfp_id(), "Dispatching job inline");
            run_locally(&self.local, &self.runner, job);
        }
    }
}
