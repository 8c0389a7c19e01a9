//! Outbound transactional mail.
//!
//! `Mailer::send` is blocking; async callers run it under `spawn_blocking`.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::{mask_email, MailConfig};

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail API unreachable: {0}")]
    Connection(String),

    #[error("Mail API returned status {status}")]
    Rejected { status: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Posts messages as JSON to a transactional mail API with bearer auth.
pub struct HttpMailer {
    api_url: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_key: Option<String>) -> Self {
        Self {
            api_url: api_url.to_string(),
            api_key,
        }
    }
}

impl Mailer for HttpMailer {
    fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| MailError::Connection(e.to_string()))?;

        let mut request = client.post(&self.api_url).json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .map_err(|e| MailError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::Rejected {
                status: response.status().as_u16(),
            });
        }
        tracing::info!(to = %mask_email(&message.to), subject = %message.subject, "Mail sent");
        Ok(())
    }
}

/// Used when no mail API is configured. Logs the envelope, never the body.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        tracing::warn!(
            to = %mask_email(&message.to),
            subject = %message.subject,
            "No mail API configured; message not delivered"
        );
        Ok(())
    }
}

/// Captures messages in memory.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent message to `to`.
    pub fn last_to(&self, to: &str) -> Option<MailMessage> {
        self.sent().into_iter().rev().find(|m| m.to == to)
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}

/// Pick the delivery backend from configuration.
pub fn mailer_from_config(config: &MailConfig) -> Box<dyn Mailer> {
    match &config.api_url {
        Some(url) => Box::new(HttpMailer::new(url, config.api_key.clone())),
        None => Box::new(LogMailer),
    }
}

/// The one-time-code email.
pub fn otp_message(from: &str, to: &str, subject: &str, code: &str) -> MailMessage {
    MailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: subject.to_string(),
        text: format!(
            "Your verification code is {code}.\n\nIt expires in 10 minutes. \
             If you did not request it, you can ignore this email."
        ),
    }
}
