use backoff::future::retry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::{Job, RetryPolicy};
use crate::domain::RfpStatus;
use crate::services::email::{notifies_suppliers, status_change_email, ChannelError, NotificationChannel};
use crate::store::{RfpStore, StoreError};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("repository: {0}")]
    Store(#[from] StoreError),

    #[error("notification channel: {0}")]
    Channel(#[from] ChannelError),
}

impl JobError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(StoreError::Corrupt(_)) => false,
            Self::Store(_) => true,
            Self::Channel(e) => e.is_transient(),
        }
    }
}

/// Executes jobs against the repository and notification channel it was
/// built with.
///
/// Background work spawned for jobs is tracked so shutdown can wait for it.
pub struct JobRunner {
    store: Arc<dyn RfpStore>,
    channel: Arc<dyn NotificationChannel>,
    policy: RetryPolicy,
    tasks: TaskTracker,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn RfpStore>,
        channel: Arc<dyn NotificationChannel>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            channel,
            policy,
            tasks: TaskTracker::new(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Spawn job work on `handle`, tracked for [`wait_idle`](Self::wait_idle).
    pub(crate) fn spawn_on<F>(&self, task: F, handle: &Handle)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn_on(task, handle);
    }

    /// Number of tracked tasks still running
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait up to `grace` for tracked work to finish. Work spawned while
    /// waiting is waited for too. Returns `false` if the grace period ran out.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        self.tasks.close();
        tokio::time::timeout(grace, self.tasks.wait()).await.is_ok()
    }

    /// Run a job once.
    pub async fn run(&self, job: &Job) -> Result<(), JobError> {
        match job {
            Job::IndexRfp { rfp_id } => self.index_rfp(*rfp_id).await,
            Job::NotifyStatusChange {
                rfp_id,
                to,
                title,
                owner_email,
                ..
            } => {
                self.notify_status_change(*rfp_id, *to, title, owner_email.as_deref())
                    .await
            }
        }
    }

    /// Run a job until it succeeds, fails permanently or exhausts the
    /// policy's attempts. The final failure is logged, not returned.
    pub async fn run_with_retry(&self, job: Job) {
        let mut attempt = 0u32;
        let max_attempts = self.policy.max_attempts.max(1);
        let job_ref = &job;

        let result = retry(self.policy.backoff(), || {
            attempt += 1;
            let current = attempt;
            async move {
                self.run(job_ref).await.map_err(|e| {
                    if e.is_retryable() && current < max_attempts {
                        warn!(job = job_ref.name(), rfp_id = %job_ref.rfp_id(), attempt = current, error = %e, "Job failed, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await;

        match result {
            Ok(()) => debug!(job = job.name(), rfp_id = %job.rfp_id(), "Job completed"),
            Err(e) => error!(
                job = job.name(),
                rfp_id = %job.rfp_id(),
                attempts = attempt,
                error = %e,
                "Job failed permanently"
            ),
        }
    }

    #[instrument(skip(self))]
    async fn index_rfp(&self, rfp_id: Uuid) -> Result<(), JobError> {
        if !self.store.refresh_search_projection(rfp_id).await? {
            debug!(rfp_id = %rfp_id, "RFP gone before indexing, skipping");
        }
        Ok(())
    }

    #[instrument(skip(self, title))]
    async fn notify_status_change(
        &self,
        rfp_id: Uuid,
        to: RfpStatus,
        title: &str,
        owner_email: Option<&str>,
    ) -> Result<(), JobError> {
        let Some(message) = status_change_email(to, title) else {
            return Ok(());
        };

        let mut recipients = Vec::new();
        match owner_email {
            Some(email) => recipients.push(email.to_string()),
            None => warn!(rfp_id = %rfp_id, "RFP owner has no address, skipping owner email"),
        }
        if notifies_suppliers(to) {
            for email in self.store.responding_supplier_emails(rfp_id).await? {
                if !recipients.contains(&email) {
                    recipients.push(email);
                }
            }
        }

        for to_email in &recipients {
            self.channel
                .send(to_email, &message.subject, &message.html_body)
                .await?;
        }
        debug!(rfp_id = %rfp_id, to = %to, recipients = recipients.len(), "Status notification sent");
        Ok(())
    }
}
