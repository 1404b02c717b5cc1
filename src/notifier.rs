//! Notifier - outbound IM robot webhook
//!
//! Messages are posted as
//!
//! ```json
//! {"msgtype": "markdown", "markdown": {"content": "..."}}
//! ```
//!
//! and a delivery counts as successful only for a 2xx reply carrying
//! `{"errcode": 0}`. Network failures and 5xx replies are retried with
//! exponential backoff; anything else fails immediately.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::NotifyError;
use crate::formatter::{MessageType, RenderedMessage};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn send(&self, message: &RenderedMessage) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotMessageType {
    Text,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotContent {
    pub content: String,
}

/// Body of a robot webhook call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotMessage {
    pub msgtype: RobotMessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<RobotContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<RobotContent>,
}

impl RobotMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            msgtype: RobotMessageType::Text,
            text: Some(RobotContent {
                content: content.into(),
            }),
            markdown: None,
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            msgtype: RobotMessageType::Markdown,
            text: None,
            markdown: Some(RobotContent {
                content: content.into(),
            }),
        }
    }
}

impl From<&RenderedMessage> for RobotMessage {
    fn from(message: &RenderedMessage) -> Self {
        match message.msg_type {
            MessageType::Text => RobotMessage::text(message.content.clone()),
            MessageType::Markdown => RobotMessage::markdown(message.content.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub retries: u32,
    /// Delay before the first retry; doubles with each further retry
    pub base: Duration,
    /// Relative jitter applied to every delay, e.g. 0.2 for ±20%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base: Duration::from_secs(1),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Nominal delay before retry number `retry` (0-based), without jitter
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(retry))
    }

    pub fn delay(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry);
        if self.jitter <= 0.0 {
            return nominal;
        }
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        nominal.mul_f64(factor.max(0.0))
    }
}

/// IM robot webhook (WeCom style)
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            url: url.into(),
            retry,
        }
    }

    async fn post_once(&self, body: &RobotMessage) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }

        let reply: Value = response.json().await.map_err(|e| NotifyError::Api {
            errcode: -1,
            errmsg: format!("unreadable reply: {e}"),
        })?;

        match reply.get("errcode").and_then(Value::as_i64) {
            Some(0) => Ok(()),
            errcode => Err(NotifyError::Api {
                errcode: errcode.unwrap_or(-1),
                errmsg: reply
                    .get("errmsg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            }),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, message))]
    async fn send(&self, message: &RenderedMessage) -> Result<(), NotifyError> {
        let body = RobotMessage::from(message);
        let mut attempt = 0u32;

        loop {
            match self.post_once(&body).await {
                Ok(()) => {
                    debug!(attempt = attempt + 1, "webhook message delivered");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.retry.retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "webhook delivery failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if attempt == 0 => return Err(e),
                Err(e) => {
                    return Err(NotifyError::Exhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    });
                }
            }
        }
    }
}
