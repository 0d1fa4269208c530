//! Notification channel (email transport)
//!
//! The dispatcher only needs `send(to, subject, html_body)`. Which transport
//! backs it is decided once at startup:
//!
//! - [`SendGridChannel`] when `SENDGRID_KEY` is set
//! - [`CapturingChannel`] when `EMAIL_BACKEND=capture` (tests, demos)
//! - [`ConsoleChannel`] otherwise

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::RfpStatus;

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

impl ChannelError {
    /// Whether resending the same message might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Unavailable(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), ChannelError>;
}

/// Rendered email for a status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub html_body: String,
}

/// Email announcing that an RFP reached `status`. `UNDER_REVIEW` and `DRAFT`
/// are silent.
pub fn status_change_email(status: RfpStatus, title: &str) -> Option<EmailMessage> {
    let title = escape_html(title);
    let (subject, body) = match status {
        RfpStatus::Published => (
            "RFP Published".to_string(),
            format!("Your RFP '{}' is published.", title),
        ),
        RfpStatus::ResponseSubmitted => (
            "RFP Response Submitted".to_string(),
            format!("Your RFP '{}' received a response.", title),
        ),
        RfpStatus::Approved | RfpStatus::Rejected => (
            format!("RFP {}", status),
            format!("Your RFP '{}' is now {}.", title, status),
        ),
        RfpStatus::Draft | RfpStatus::UnderReview => return None,
    };
    Some(EmailMessage {
        subject,
        html_body: body,
    })
}

/// Whether responding suppliers are copied on a status email
pub fn notifies_suppliers(status: RfpStatus) -> bool {
    matches!(status, RfpStatus::Approved | RfpStatus::Rejected)
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Logs messages instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct ConsoleChannel;

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), ChannelError> {
        info!(to = %to, subject = %subject, body = %html_body, "Email (console)");
        Ok(())
    }
}

/// SendGrid v3 mail API
#[derive(Clone)]
pub struct SendGridChannel {
    client: reqwest::Client,
    api_key: String,
    from: String,
    endpoint: String,
}

#[derive(Serialize)]
struct SendGridMail<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

impl SendGridChannel {
    /// Build a channel whose requests give up after `timeout`.
    pub fn new(api_key: String, from: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create SendGrid HTTP client")?;

        info!(timeout_secs = timeout.as_secs(), "SendGrid channel initialized");

        Ok(Self {
            client,
            api_key,
            from,
            endpoint: SENDGRID_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl NotificationChannel for SendGridChannel {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), ChannelError> {
        let mail = SendGridMail {
            personalizations: [Personalization {
                to: [Address { email: to }],
            }],
            from: Address { email: &self.from },
            subject,
            content: [Content {
                kind: "text/html",
                value: html_body,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&mail)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(to = %to, subject = %subject, "Email sent via SendGrid");
        Ok(())
    }
}

/// A message recorded by [`CapturingChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Keeps every message in memory. Can be told to fail the next N sends.
#[derive(Debug, Default)]
pub struct CapturingChannel {
    sent: Mutex<Vec<SentEmail>>,
    failures_left: AtomicU32,
}

impl CapturingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().clone()
    }

    /// Make the next `n` sends fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationChannel for CapturingChannel {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), ChannelError> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ChannelError::Unavailable("simulated outage".to_string()));
        }

        self.sent.lock().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_follow_target_status() {
        let published = status_change_email(RfpStatus::Published, "Desks").unwrap();
        assert_eq!(published.subject, "RFP Published");
        assert_eq!(published.html_body, "Your RFP 'Desks' is published.");

        let approved = status_change_email(RfpStatus::Approved, "Desks").unwrap();
        assert_eq!(approved.subject, "RFP APPROVED");
        assert_eq!(approved.html_body, "Your RFP 'Desks' is now APPROVED.");

        assert!(status_change_email(RfpStatus::UnderReview, "Desks").is_none());
        assert!(notifies_suppliers(RfpStatus::Rejected));
        assert!(!notifies_suppliers(RfpStatus::Published));
    }

    #[test]
    fn titles_are_escaped() {
        let msg = status_change_email(RfpStatus::Published, "<b>Desks</b>").unwrap();
        assert_eq!(msg.html_body, "Your RFP '&lt;b&gt;Desks&lt;/b&gt;' is published.");
    }

    #[test]
    fn rejected_status_transience() {
        let throttled = ChannelError::Rejected {
            status: 429,
            body: String::new(),
        };
        let bad_request = ChannelError::Rejected {
            status: 400,
            body: String::new(),
        };
        assert!(throttled.is_transient());
        assert!(!bad_request.is_transient());
    }

    #[tokio::test]
    async fn stalled_provider_times_out_as_transient() {
        // Accepts the connection and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let channel = SendGridChannel::new(
            "key".to_string(),
            "from@rfp.local".to_string(),
            Duration::from_millis(200),
        )
        .unwrap()
        .with_endpoint(format!("http://{}/v3/mail/send", addr));

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            channel.send("a@x.io", "s", "b"),
        )
        .await
        .expect("send returns once the client timeout fires");
        let err = outcome.unwrap_err();
        assert!(matches!(err, ChannelError::Transport(_)));
        assert!(err.is_transient());
        hold.abort();
    }

    #[tokio::test]
    async fn capturing_channel_fails_then_records() {
        let channel = CapturingChannel::new();
        channel.fail_next(1);
        assert!(channel.send("a@x.io", "s", "b").await.is_err());
        channel.send("a@x.io", "s", "b").await.unwrap();
        assert_eq!(channel.sent().len(), 1);
    }
}
