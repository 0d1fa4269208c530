//! Notification/index dispatcher
//!
//! Turns committed domain events into side effects (search projection
//! refresh, status emails) without making the request wait. Two strategies
//! share one contract and are chosen once at startup:
//!
//! - [`InlineDispatcher`]: deferred work on an in-process executor
//! - [`QueueBackedDispatcher`]: jobs pushed to a [`JobQueue`] and drained by a
//!   [`QueueWorker`], falling back to the in-process executor when the queue
//!   cannot take them
//!
//! Nothing here returns an error to the caller. Failures are retried with
//! exponential backoff and logged.

mod inline;
mod jobs;
mod local;
pub mod queue;
mod queue_backed;
mod runner;
mod worker;

pub use inline::InlineDispatcher;
pub use jobs::Job;
pub use local::LocalExecutor;
pub use queue::{JobQueue, MemoryJobQueue, QueueError, QueuedJob, RedisJobQueue};
pub use queue_backed::QueueBackedDispatcher;
pub use runner::{JobError, JobRunner};
pub use worker::QueueWorker;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use parking_lot::Mutex;
use std::time::Duration;

use crate::domain::DomainEvent;

/// Accepts domain events after their transaction committed.
///
/// `dispatch` must return without waiting on the notification channel or the
/// broker, and must never fail the caller.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, event: DomainEvent);
}

/// Retry schedule shared by in-process retries and queue re-delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            // Attempts are counted by the caller
            .with_max_elapsed_time(None)
            .build()
    }

    /// Delay before re-delivering a job whose `attempt`-th run failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_interval
            .saturating_mul(factor)
            .min(self.max_interval)
    }
}

/// Keeps dispatched events in memory and performs no side effects.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingDispatcher {
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}
