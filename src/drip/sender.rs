//! Outbound email collaborator.
//!
//! The sequencer only sees `CommunicationSender`; `HttpEmailSender` talks to
//! a Resend-compatible JSON API.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EmailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider message id, when the provider returns one.
    pub message_id: Option<String>,
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Email sender is not configured: {0}")]
    NotConfigured(String),

    #[error("Cannot reach email provider at {0}")]
    Connection(String),

    #[error("Email provider timed out after {0}s")]
    Timeout(u64),

    #[error("Email provider rejected message (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<SendReceipt, SendError>> + Send + 'a>>;

/// Delivers one rendered email. Any `Err` means "not sent".
pub trait CommunicationSender: Send + Sync {
    fn send<'a>(&'a self, email: &'a OutboundEmail) -> SendFuture<'a>;
}

/// Request body for POST /emails
#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

/// Response body from POST /emails
#[derive(Deserialize)]
struct SendEmailResponse {
    id: Option<String>,
}

pub struct HttpEmailSender {
    client: reqwest::Client,
    config: EmailConfig,
    timeout_secs: u64,
}

impl HttpEmailSender {
    pub fn new(config: EmailConfig, timeout: Duration) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SendError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            config,
            timeout_secs: timeout.as_secs(),
        })
    }

    async fn post(&self, email: &OutboundEmail) -> Result<SendReceipt, SendError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| SendError::NotConfigured("PROTOCARE_EMAIL_API_KEY is not set".into()))?;

        let body = SendEmailRequest {
            from: &self.config.from,
            to: [email.to.as_str()],
            subject: &email.subject,
            html: &email.html,
            reply_to: self.config.reply_to.as_deref(),
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SendError::Connection(self.config.api_url.clone())
                } else if e.is_timeout() {
                    SendError::Timeout(self.timeout_secs)
                } else {
                    SendError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // Some providers answer 200 with an empty body; the send still counts.
        let message_id = response
            .json::<SendEmailResponse>()
            .await
            .ok()
            .and_then(|r| r.id);
        Ok(SendReceipt { message_id })
    }
}

impl CommunicationSender for HttpEmailSender {
    fn send<'a>(&'a self, email: &'a OutboundEmail) -> SendFuture<'a> {
        Box::pin(self.post(email))
    }
}
