//! Outbound mail delivery.
//!
//! Handlers never send mail inline: they hand a [`MailMessage`] to the
//! background runner, which calls a [`Mailer`]. The relay mailer POSTs the
//! message as JSON to an HTTP mail relay and retries a fixed number of times.
//! Without a relay URL the [`LogMailer`] records the send in the log instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;

pub type MailFuture<'a> = Pin<Box<dyn Future<Output = Result<(), MailError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Transport(String),

    #[error("mail relay rejected the message with status {0}")]
    Rejected(u16),

    #[error("mail delivery failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<MailError> },
}

/// A templated message. `data` carries the template variables.
#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub recipient: String,
    pub template: String,
    pub data: serde_json::Value,
}

impl MailMessage {
    pub fn new(recipient: impl Into<String>, template: &str, data: serde_json::Value) -> Self {
        Self {
            recipient: recipient.into(),
            template: template.to_string(),
            data,
        }
    }
}

/// Mail delivery abstraction used by background tasks.
pub trait Mailer: Send + Sync {
    /// Deliver `message`, retrying internally where the transport allows.
    fn send<'a>(&'a self, message: &'a MailMessage) -> MailFuture<'a>;
}

/// Fixed-delay retry settings.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Run `attempt` until it succeeds or `policy.max_attempts` is reached.
pub async fn with_retry<F, Fut>(policy: RetryPolicy, mut attempt: F) -> Result<(), MailError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), MailError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n).await {
            Ok(()) => return Ok(()),
            Err(e) if n >= max_attempts => {
                return Err(MailError::Exhausted {
                    attempts: n,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                warn!(attempt = n, error = %e, "Mail delivery attempt failed, retrying");
                tokio::time::sleep(policy.delay).await;
                n += 1;
            }
        }
    }
}

/// Wire body sent to the relay.
#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    template: &'a str,
    data: &'a serde_json::Value,
}

/// Delivers mail through an HTTP relay.
pub struct RelayMailer {
    client: reqwest::Client,
    endpoint: String,
    sender: String,
    policy: RetryPolicy,
}

impl RelayMailer {
    pub fn new(
        endpoint: impl Into<String>,
        sender: impl Into<String>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            sender: sender.into(),
            policy,
        })
    }

    async fn post_once(&self, message: &MailMessage) -> Result<(), MailError> {
        let body = RelayRequest {
            from: &self.sender,
            to: &message.recipient,
            template: &message.template,
            data: &message.data,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(MailError::Rejected(status.as_u16()))
        }
    }
}

impl Mailer for RelayMailer {
    fn send<'a>(&'a self, message: &'a MailMessage) -> MailFuture<'a> {
        Box::pin(async move {
            with_retry(self.policy, |_| self.post_once(message)).await?;
            debug!(template = %message.template, "Mail accepted by relay");
            Ok(())
        })
    }
}

/// Local development mailer that logs instead of delivering.
///
/// Template data is not logged since it carries token plaintexts.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send<'a>(&'a self, message: &'a MailMessage) -> MailFuture<'a> {
        Box::pin(async move {
            info!(
                recipient = %message.recipient,
                template = %message.template,
                "Mail relay not configured, message logged only"
            );
            Ok(())
        })
    }
}

/// Select the mailer for this configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn Mailer>, MailError> {
    match &config.mail_relay_url {
        Some(url) => {
            let policy = RetryPolicy {
                max_attempts: config.mail_max_attempts,
                delay: config.mail_retry_delay,
            };
            let mailer = RelayMailer::new(
                url.clone(),
                config.mail_sender.clone(),
                config.mail_timeout,
                policy,
            )?;
            Ok(Arc::new(mailer))
        }
        None => Ok(Arc::new(LogMailer)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(quick(), |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(MailError::Rejected(503))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = with_retry(quick(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MailError::Transport("connection refused".to_string())) }
        })
        .await;

        match result {
            Err(MailError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let message = MailMessage::new(
            "alice@example.com",
            "user_welcome",
            serde_json::json!({"activationToken": "x"}),
        );
        assert!(LogMailer.send(&message).await.is_ok());
    }

    #[tokio::test]
    async fn test_relay_mailer_reports_unreachable_relay() {
        let mailer = RelayMailer::new(
            "http://127.0.0.1:9/mail",
            "no-reply@example.com",
            Duration::from_millis(200),
            RetryPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(1),
            },
        )
        .unwrap();
        let message = MailMessage::new("alice@example.com", "user_welcome", serde_json::json!({}));

        let err = mailer.send(&message).await.unwrap_err();
        assert!(matches!(err, MailError::Exhausted { attempts: 2, .. }));
    }

    #[test]
    fn test_from_config_without_relay_uses_log_mailer() {
        assert!(from_config(&Config::default()).is_ok());
    }
}
