//! Outgoing email.
//!
//! Handlers depend on the [`Mailer`] trait. Production wires in [`SmtpMailer`], which relays
//! through an authenticated SMTP submission server (Gmail with an app password by default).

use crate::config::MailConfig;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use thiserror::Error;


#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Mail rejected: {0}")]
    Rejected(String),
}

/// One outgoing email. Addresses may carry a display name: `"Nexus Team" <team@example.com>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    /// Plain-text alternative. HTML-only when absent.
    pub text: Option<String>,
}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

pub(crate) fn build_message(email: &Email) -> Result<Message, MailError> {
    let mut builder = Message::builder()
        .from(email.from.parse::<Mailbox>()?)
        .to(email.to.parse::<Mailbox>()?)
        .subject(email.subject.clone());

    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(reply_to.parse::<Mailbox>()?);
    }

    let message = match &email.text {
        Some(text) => builder.multipart(MultiPart::alternative_plain_html(
            text.clone(),
            email.html.clone(),
        ))?,
        None => builder.header(ContentType::TEXT_HTML).body(email.html.clone())?,
    };

    Ok(message)
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Relays through `host` over implicit TLS with the given login.
    pub fn new(host: &str, username: &str, password: &str) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();

        Ok(Self { transport })
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let message = build_message(&email)?;
        self.transport.send(message).await?;
        tracing::debug!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Used when no SMTP password is configured. Every send fails, so handlers record the error.
pub struct UnconfiguredMailer;

#[async_trait::async_trait]
impl Mailer for UnconfiguredMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::warn!(to = %email.to, "mail password not configured; email dropped");
        Err(MailError::Rejected("mail password not configured".to_string()))
    }
}

/// The SMTP mailer for `config`, or [`UnconfiguredMailer`] when the password is missing.
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match config.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => Ok(Arc::new(SmtpMailer::new(
            &config.smtp_host,
            &config.username,
            password,
        )?)),
        None => {
            tracing::warn!("mail.password is not set; outgoing email is disabled");
            Ok(Arc::new(UnconfiguredMailer))
        }
    }
}
