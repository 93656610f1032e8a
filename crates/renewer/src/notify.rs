//! Failure notifications.
//!
//! Notifications are best effort: callers log a failed delivery and move on.

use std::error::Error as StdError;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info};

use vaultcert_common::DomainSet;
use vaultcert_config::NotificationConfig;

/// Subject used for failed renewal cycles
pub const FAILURE_SUBJECT: &str = "Certificate Processing Error";

/// Errors delivering a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Required SMTP setting absent
    #[error("incomplete SMTP configuration: {0} is not set")]
    Incomplete(&'static str),

    /// A sender or recipient address does not parse
    #[error("invalid e-mail address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    /// The message could not be built
    #[error("failed to build notification e-mail: {0}")]
    Message(#[from] lettre::error::Error),

    /// SMTP delivery failed
    #[error("failed to send notification e-mail: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Destination for operator notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Build the notifier described by `config`
pub fn from_config(config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    if config.enabled {
        Ok(Arc::new(EmailNotifier::new(config)?))
    } else {
        Ok(Arc::new(DisabledNotifier))
    }
}

/// Body of the e-mail sent when a renewal cycle fails
pub fn failure_body(domains: &DomainSet, error: &(dyn StdError + 'static)) -> String {
    format!(
        "Error processing certificates for domains: {}\n\nError details:\n{}",
        domains,
        error_chain(error)
    )
}

/// `error` followed by each of its sources, joined by `: `
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut details = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(details, ": {}", cause);
        source = cause.source();
    }
    details
}

/// Notifier used when e-mail notifications are turned off
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, subject: &str, _body: &str) -> Result<(), NotifyError> {
        debug!(subject = %subject, "Notifications disabled, dropping message");
        Ok(())
    }
}

/// SMTP notifier using STARTTLS
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotifyError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or(NotifyError::Incomplete("SMTP_HOST"))?;
        let username = config
            .username
            .clone()
            .ok_or(NotifyError::Incomplete("SMTP_USERNAME"))?;
        let password = config
            .password
            .as_ref()
            .ok_or(NotifyError::Incomplete("SMTP_PASSWORD"))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(username, password.expose().to_string()))
            .build();

        Ok(Self {
            transport,
            from: parse_mailbox(&config.from)?,
            to: parse_mailbox(&config.to)?,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        self.transport.send(message).await?;
        info!(to = %self.to, "Notification e-mail sent");
        Ok(())
    }
}

impl std::fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .finish()
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })
}
