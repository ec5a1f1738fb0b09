//! Job outcome notifications
//!
//! One message per terminal state, best-effort: delivery failure is logged
//! and never resurrects the job transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::Mailbox,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, instrument};

use crate::config::SmtpConfig;
use crate::training::types::JobStatus;

/// Terminal outcome report for one job transaction.
#[derive(Debug, Clone)]
pub struct Notification {
    pub recipient: String,
    pub job_name: String,
    pub model_name: String,
    pub status: JobStatus,
    /// Upstream error detail, present for failed jobs when the provider
    /// reported one.
    pub detail: Option<String>,
}

impl Notification {
    pub fn subject(&self) -> String {
        format!("Training job {}: {}", self.job_name, self.status)
    }

    pub fn body(&self) -> String {
        match (&self.status, &self.detail) {
            (JobStatus::Completed, _) => format!(
                "Training job {} for model {} completed successfully.",
                self.job_name, self.model_name
            ),
            (JobStatus::TimedOut, _) => format!(
                "Training job {} for model {} did not reach a terminal state within its \
                 maximum runtime. The remote job may still be running.",
                self.job_name, self.model_name
            ),
            (_, Some(detail)) => format!(
                "Training job {} for model {} failed: {}",
                self.job_name, self.model_name, detail
            ),
            (_, None) => format!(
                "Training job {} for model {} failed.",
                self.job_name, self.model_name
            ),
        }
    }
}

/// Delivery seam for terminal-state notifications.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// SMTP-backed notifier. Transport settings are server configuration; the
/// recipient arrives with each submission request.
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .context("Invalid SMTP host")?
            .port(config.port);

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from: config
                .from
                .parse()
                .context("Invalid SMTP from address")?,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    #[instrument(skip(self, notification), fields(job_name = %notification.job_name))]
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(notification
                .recipient
                .parse()
                .context("Invalid notification recipient")?)
            .subject(notification.subject())
            .body(notification.body())
            .context("Failed to build notification message")?;

        self.transport
            .send(message)
            .await
            .context("Failed to send notification email")?;

        info!(
            recipient = %notification.recipient,
            status = %notification.status,
            "Notification sent"
        );

        Ok(())
    }
}
