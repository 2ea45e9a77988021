//! Outbound e-mail: the signup welcome and new-message notifications.
//!
//! Delivery is always best-effort. Handlers call [`Mailer::dispatch`], which
//! spawns the send and logs failures; nothing is reported to the caller.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info, warn};
use trojan_shared::constants::APP_NAME;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// A plain-text e-mail waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone)]
pub enum Mailer {
    /// Deliver through an SMTP relay.
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    /// Record the would-be e-mail in the log.
    Log,
    /// Collect e-mails in memory.
    #[cfg(test)]
    Memory(std::sync::Arc<std::sync::Mutex<Vec<Email>>>),
}

impl Mailer {
    pub fn from_config(smtp: Option<&SmtpConfig>) -> Result<Self, MailError> {
        let Some(smtp) = smtp else {
            info!("SMTP not configured, e-mails will be logged only");
            return Ok(Mailer::Log);
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
            .credentials(Credentials::new(
                smtp.username.clone(),
                smtp.password.clone(),
            ))
            .build();
        let from: Mailbox = smtp.from.parse()?;

        info!(host = %smtp.host, from = %from, "SMTP mailer initialized");
        Ok(Mailer::Smtp { transport, from })
    }

    pub async fn send(&self, email: Email) -> Result<(), MailError> {
        match self {
            Mailer::Smtp { transport, from } => {
                let message = lettre::Message::builder()
                    .from(from.clone())
                    .to(email.to.parse::<Mailbox>()?)
                    .subject(&email.subject)
                    .header(ContentType::TEXT_PLAIN)
                    .body(email.body)?;
                transport.send(message).await?;
                debug!(to = %email.to, subject = %email.subject, "E-mail sent");
            }
            Mailer::Log => {
                info!(to = %email.to, subject = %email.subject, body = %email.body, "E-mail (not sent)");
            }
            #[cfg(test)]
            Mailer::Memory(outbox) => {
                if let Ok(mut outbox) = outbox.lock() {
                    outbox.push(email);
                }
            }
        }
        Ok(())
    }

    /// Send in the background; failures are logged and dropped.
    pub fn dispatch(&self, email: Email) {
        let mailer = self.clone();
        tokio::spawn(async move {
            let to = email.to.clone();
            let subject = email.subject.clone();
            if let Err(e) = mailer.send(email).await {
                warn!(to = %to, subject = %subject, error = %e, "Failed to send e-mail");
            }
        });
    }
}

pub fn welcome_email(to: &str, first_name: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("Welcome to {APP_NAME}!"),
        body: format!(
            "Hi {first_name},\n\n\
             Your {APP_NAME} account is ready. Start browsing listings or post \
             your first item for sale.\n\n\
             Fight on!\n"
        ),
    }
}

pub fn message_notification(to: &str, sender_username: &str, listing_name: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "You have a new message on TrojanTrade!".to_string(),
        body: format!(
            "{sender_username} sent you a message about \"{listing_name}\".\n\n\
             Log in to {APP_NAME} to read and reply.\n"
        ),
    }
}
