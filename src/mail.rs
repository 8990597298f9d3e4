// SMTP delivery for alert mails

use anyhow::{Context, Result};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::response::Response;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{debug, error};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

/// Send a plain-text mail. Returns the identifier the server assigned to
/// the message, or `None` after logging if delivery failed.
pub async fn send_mail(
    smtp: &SmtpConfig,
    recipients: &[String],
    sender: &str,
    subject: &str,
    body: &str,
) -> Option<String> {
    match try_send_mail(smtp, recipients, sender, subject, body).await {
        Ok(message_id) => {
            debug!("Mail {:?} accepted by {} as {}", subject, smtp.host, message_id);
            Some(message_id)
        }
        Err(e) => {
            error!("Failed to send mail via {}:{}: {:#}", smtp.host, smtp.port, e);
            None
        }
    }
}

async fn try_send_mail(
    smtp: &SmtpConfig,
    recipients: &[String],
    sender: &str,
    subject: &str,
    body: &str,
) -> Result<String> {
    let message = build_message(recipients, sender, subject, body)?;
    debug!(
        "Mail message was formed:\n{}",
        String::from_utf8_lossy(&message.formatted())
    );

    // STARTTLS is used only when the server advertises it
    let tls = TlsParameters::new(smtp.host.clone()).context("invalid TLS parameters")?;
    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp.host.as_str())
        .port(smtp.port)
        .tls(Tls::Opportunistic(tls))
        .timeout(Some(smtp.timeout));
    if let (Some(user), Some(password)) = (&smtp.user, &smtp.password) {
        builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
    }

    let response = builder
        .build()
        .send(message)
        .await
        .context("SMTP delivery failed")?;
    Ok(message_id(&response))
}

/// Compose the mail sent to every recipient
pub fn build_message(
    recipients: &[String],
    sender: &str,
    subject: &str,
    body: &str,
) -> Result<Message> {
    let from: Mailbox = sender
        .parse()
        .with_context(|| format!("invalid sender address {:?}", sender))?;
    let mut builder = Message::builder()
        .from(from)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN);
    for recipient in recipients {
        let to: Mailbox = recipient
            .parse()
            .with_context(|| format!("invalid recipient address {:?}", recipient))?;
        builder = builder.to(to);
    }
    builder
        .body(body.to_string())
        .context("failed to build mail message")
}

// "250 2.0.0 Ok: queued as 4F1A2B" -> "4F1A2B"
fn message_id(response: &Response) -> String {
    response
        .first_line()
        .and_then(|line| line.split_whitespace().last())
        .map(str::to_string)
        .unwrap_or_else(|| response.code().to_string())
}
