//! Outbound webhook delivery.
//!
//! A submission is a one-way notification to a user-supplied automation
//! webhook. In the default [`DeliveryMode::FireAndForget`] mode delivery is
//! at-most-once and unconfirmed: the response status and body are never
//! inspected, so only hard transport failures (bad URL, connection refused,
//! timeout) are observable. [`DeliveryMode::Confirmed`] opts into reading the
//! response, treating non-2xx as a failure and accepting a `{"tasks": [...]}`
//! body as the generated task list.
//!
//! The URL comes from the user's profile and the request is made by this
//! service, so it can reach any host the service can, loopback and internal
//! addresses included. Redirects are never followed: a 3xx answer is the
//! final response.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Payload posted to the webhook. Field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSubmission {
    pub email: String,
    pub role: String,
    pub goal: String,
    pub transcript: String,
    /// ISO-8601 timestamp with millisecond precision.
    pub timestamp: String,
    pub user_id: String,
}

impl TranscriptSubmission {
    /// Build a submission stamped with the current time.
    pub fn new(
        email: impl Into<String>,
        role: impl Into<String>,
        goal: impl Into<String>,
        transcript: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            role: role.into(),
            goal: goal.into(),
            transcript: transcript.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            user_id: user_id.into(),
        }
    }
}

/// How much of the webhook response the caller gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    FireAndForget,
    Confirmed,
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FireAndForget => write!(f, "fire_and_forget"),
            Self::Confirmed => write!(f, "confirmed"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fire_and_forget" | "fire-and-forget" => Ok(Self::FireAndForget),
            "confirmed" => Ok(Self::Confirmed),
            other => Err(format!(
                "expected 'fire_and_forget' or 'confirmed', got '{other}'"
            )),
        }
    }
}

/// What the caller learned about a delivery that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "delivery", rename_all = "snake_case")]
pub enum DeliveryReceipt {
    /// The request went out; nothing is known about how it was received.
    Unconfirmed,
    /// The webhook answered with a success status.
    Confirmed {
        status: u16,
        tasks: Option<Vec<String>>,
    },
}

impl DeliveryReceipt {
    /// Tasks returned by the webhook, if it returned any.
    pub fn tasks(&self) -> Option<&[String]> {
        match self {
            Self::Confirmed {
                tasks: Some(tasks), ..
            } => Some(tasks),
            _ => None,
        }
    }
}

/// Sends transcript submissions to an external webhook.
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn deliver(
        &self,
        url: &str,
        submission: &TranscriptSubmission,
    ) -> Result<DeliveryReceipt, TransportError>;
}

#[derive(Debug, Deserialize)]
struct ConfirmedBody {
    #[serde(default)]
    tasks: Option<Vec<String>>,
}

/// `reqwest`-backed webhook client.
pub struct HttpWebhook {
    client: reqwest::Client,
    mode: DeliveryMode,
}

impl HttpWebhook {
    pub fn new(mode: DeliveryMode, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::RequestFailed(format!("Failed to build client: {e}")))?;
        Ok(Self { client, mode })
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhook {
    async fn deliver(
        &self,
        url: &str,
        submission: &TranscriptSubmission,
    ) -> Result<DeliveryReceipt, TransportError> {
        let url = reqwest::Url::parse(url.trim())
            .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;

        let response = self
            .client
            .post(url.clone())
            .json(submission)
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        let status = response.status();
        match self.mode {
            DeliveryMode::FireAndForget => {
                debug!(host = ?url.host_str(), "Webhook request sent (unconfirmed)");
                Ok(DeliveryReceipt::Unconfirmed)
            }
            DeliveryMode::Confirmed => {
                if !status.is_success() {
                    warn!(host = ?url.host_str(), status = status.as_u16(), "Webhook rejected submission");
                    return Err(TransportError::Rejected {
                        status: status.as_u16(),
                    });
                }
                let tasks = response
                    .json::<ConfirmedBody>()
                    .await
                    .ok()
                    .and_then(|body| body.tasks);
                info!(
                    host = ?url.host_str(),
                    status = status.as_u16(),
                    returned_tasks = tasks.as_ref().map(Vec::len),
                    "Webhook confirmed delivery"
                );
                Ok(DeliveryReceipt::Confirmed {
                    status: status.as_u16(),
                    tasks,
                })
            }
        }
    }
}
