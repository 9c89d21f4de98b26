//! Outbound email.
//!
//! Callers name a template and pass its data; [`Mailer::send`] renders it and
//! hands the message to the transport. Without SMTP settings the servers use
//! [`LogMailer`], which only logs what would have been sent.

mod smtp;
pub mod templates;

pub use smtp::SmtpMailer;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("unknown email template: {0}")]
    UnknownTemplate(String),
    #[error("template error: {0}")]
    Template(String),
    #[error("invalid address: {0}")]
    Address(String),
    #[error("failed to send email: {0}")]
    SendFailed(String),
    #[error("invalid mailer configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// A fully rendered message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub attachments: Vec<Attachment>,
}

impl OutgoingEmail {
    /// Render `template` with `data` into a message.
    ///
    /// # Errors
    /// Propagates template errors.
    pub fn from_template(
        from: &str,
        to: &str,
        subject: &str,
        template: &str,
        data: &Value,
    ) -> Result<Self, MailError> {
        let content = templates::render(template, data)?;
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            text: content.text,
            html: content.html,
            attachments: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, email: OutgoingEmail) -> Result<(), MailError>;

    /// Render `template` with `data` and deliver it.
    async fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        template: &str,
        data: &Value,
    ) -> Result<(), MailError> {
        let email = OutgoingEmail::from_template(from, to, subject, template, data)?;
        self.deliver(email).await
    }
}

/// Logs messages instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, email: OutgoingEmail) -> Result<(), MailError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "email delivery skipped (no SMTP configured)"
        );
        debug!(body = %email.text, "email body");
        Ok(())
    }
}

/// Keeps every delivered message in memory, newest last.
#[derive(Debug, Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl OutboxMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn deliver(&self, email: OutgoingEmail) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|_| MailError::SendFailed("outbox lock poisoned".to_string()))?
            .push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn send_renders_template() -> Result<(), MailError> {
        let mailer = OutboxMailer::new();
        mailer
            .send(
                "info@widgets.dev",
                "user@example.com",
                "Password Reset Link",
                templates::PASSWORD_RESET,
                &json!({ "link": "http://localhost/reset" }),
            )
            .await?;

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "user@example.com");
        assert_eq!(sent[0].subject, "Password Reset Link");
        assert!(sent[0].text.contains("http://localhost/reset"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_template_is_not_delivered() {
        let mailer = OutboxMailer::new();
        let result = mailer
            .send("a@b.c", "d@e.f", "subject", "nope", &json!({}))
            .await;
        assert!(result.is_err());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn log_mailer_accepts_everything() -> Result<(), MailError> {
        LogMailer
            .send(
                "a@b.c",
                "d@e.f",
                "subject",
                templates::INVOICE,
                &json!({ "first_name": "Ada", "order_id": 1 }),
            )
            .await
    }
}
