mod templates;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EmailConfig;

pub use templates::{Composer, ResultSummary};

/// A fully rendered plain-text email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail relay answered with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Short transport name, reported at startup.
    fn name(&self) -> &'static str;

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Writes every message to the log instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, "Email (not delivered, log only)");
        Ok(())
    }
}

/// Hands messages to an HTTP relay as JSON `OutgoingEmail` bodies.
pub struct RelayMailer {
    client: reqwest::Client,
    url: String,
}

impl RelayMailer {
    pub fn new(url: impl Into<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let response = self.client.post(&self.url).json(email).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Pick the mailer for this configuration. Without `enabled` and a relay URL, mail is only logged.
pub fn build_mailer(config: &EmailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match (&config.relay_url, config.enabled) {
        (Some(url), true) => {
            info!(relay = %url, "Email delivery via HTTP relay");
            Ok(Arc::new(RelayMailer::new(url.clone())?))
        }
        _ => {
            info!("Email delivery disabled, messages are logged only");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Deliver a batch. Failures are logged and skipped; returns how many were sent.
pub async fn send_all(mailer: &dyn Mailer, emails: Vec<OutgoingEmail>) -> usize {
    let mut sent = 0;
    for email in &emails {
        match mailer.send(email).await {
            Ok(()) => sent += 1,
            Err(e) => warn!(to = %email.to, subject = %email.subject, error = %e, "Failed to send email"),
        }
    }
    sent
}
