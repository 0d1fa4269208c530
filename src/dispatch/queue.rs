//! Job queues for the queue-backed dispatcher

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::error;
use uuid::Uuid;

use super::Job;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Envelope carried through the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub job: Job,
    /// 1 on first delivery
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(job: Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }

    /// Same job, next delivery attempt
    pub fn next_attempt(&self) -> Self {
        Self {
            id: self.id,
            job: self.job.clone(),
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Wait up to `timeout` for the next job.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError>;

    /// Park a job that will not be retried.
    async fn dead_letter(&self, job: &QueuedJob) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis list queue: `LPUSH` to enqueue, `BRPOP` to consume, failed jobs on
/// `<queue>:dead`.
#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
    // BRPOP blocks its connection, so consumers get their own
    consumer: ConnectionManager,
    queue: String,
    dead_queue: String,
}

impl RedisJobQueue {
    pub async fn connect(redis_url: &str, queue: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client.clone())
            .await
            .context("Failed to connect to Redis")?;
        let consumer = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!(queue = %queue, "Redis job queue connected");

        Ok(Self {
            conn,
            consumer,
            queue: queue.to_string(),
            dead_queue: format!("{}:dead", queue),
        })
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(job)?;
        conn.lpush::<_, _, ()>(&self.queue, payload).await?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError> {
        let mut conn = self.consumer.clone();
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.queue)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        let Some((_, payload)) = popped else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                // Already off the list; park the raw payload so it is not lost
                error!(queue = %self.queue, error = %e, "Malformed job payload, dead-lettering");
                let mut conn = self.conn.clone();
                conn.lpush::<_, _, ()>(&self.dead_queue, &payload).await?;
                Err(QueueError::Payload(e))
            }
        }
    }

    async fn dead_letter(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(job)?;
        conn.lpush::<_, _, ()>(&self.dead_queue, payload).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Process-local queue with the same semantics as [`RedisJobQueue`]. Jobs
/// are held as JSON payloads, like on the broker.
/// Can be switched unavailable to exercise fallbacks.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    pending: Mutex<VecDeque<String>>,
    dead: Mutex<Vec<String>>,
    notify: Notify,
    unavailable: AtomicBool,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn pending(&self) -> Vec<QueuedJob> {
        decode_all(&self.pending.lock().iter().cloned().collect::<Vec<_>>())
    }

    /// Dead-lettered jobs that still decode
    pub fn dead_letters(&self) -> Vec<QueuedJob> {
        decode_all(&self.dead.lock())
    }

    /// Every dead-lettered payload as stored, malformed ones included
    pub fn dead_payloads(&self) -> Vec<String> {
        self.dead.lock().clone()
    }

    /// Push a payload as-is, as another producer on the broker might.
    pub fn push_raw(&self, payload: impl Into<String>) {
        self.pending.lock().push_back(payload.into());
        self.notify.notify_one();
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("memory queue switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.check_available()?;
        let payload = serde_json::to_string(job)?;
        self.pending.lock().push_back(payload);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedJob>, QueueError> {
        self.check_available()?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let next = self.pending.lock().pop_front();
            if let Some(payload) = next {
                return match serde_json::from_str(&payload) {
                    Ok(job) => Ok(Some(job)),
                    Err(e) => {
                        error!(error = %e, "Malformed job payload, dead-lettering");
                        self.dead.lock().push(payload);
                        Err(QueueError::Payload(e))
                    }
                };
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn dead_letter(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        self.dead.lock().push(payload);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.check_available()
    }
}

fn decode_all(payloads: &[String]) -> Vec<QueuedJob> {
    payloads
        .iter()
        .filter_map(|p| serde_json::from_str(p).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_queue_is_fifo() {
        let queue = MemoryJobQueue::new();
        let first = QueuedJob::new(Job::IndexRfp { rfp_id: Uuid::new_v4() });
        let second = QueuedJob::new(Job::IndexRfp { rfp_id: Uuid::new_v4() });
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(queue.dequeue(timeout).await.unwrap(), Some(first));
        assert_eq!(queue.dequeue(timeout).await.unwrap(), Some(second));
        assert_eq!(queue.dequeue(timeout).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unavailable_queue_rejects_enqueue() {
        let queue = MemoryJobQueue::new();
        queue.set_unavailable(true);
        let job = QueuedJob::new(Job::IndexRfp { rfp_id: Uuid::new_v4() });
        assert!(matches!(
            queue.enqueue(&job).await,
            Err(QueueError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn malformed_payload_is_parked_not_lost() {
        let queue = MemoryJobQueue::new();
        queue.push_raw(r#"{"kind":"reticulate_splines"}"#);
        let good = QueuedJob::new(Job::IndexRfp { rfp_id: Uuid::new_v4() });
        queue.enqueue(&good).await.unwrap();

        let timeout = Duration::from_millis(10);
        assert!(matches!(
            queue.dequeue(timeout).await,
            Err(QueueError::Payload(_))
        ));
        assert_eq!(
            queue.dead_payloads(),
            vec![r#"{"kind":"reticulate_splines"}"#.to_string()]
        );
        assert!(queue.dead_letters().is_empty());

        // The next job still comes through
        assert_eq!(queue.dequeue(timeout).await.unwrap(), Some(good));
    }

    #[test]
    fn next_attempt_keeps_identity() {
        let job = QueuedJob::new(Job::IndexRfp { rfp_id: Uuid::new_v4() });
        let retry = job.next_attempt();
        assert_eq!(retry.id, job.id);
        assert_eq!(retry.attempt, 2);
    }
}
