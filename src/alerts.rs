// src/alerts.rs
// Alert routing to chat webhooks and email

use crate::config::MonitorConfig;
use crate::mail::{self, SmtpConfig};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;

#[derive(Serialize, Clone, Debug)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub subject: String,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Critical,
}

impl AlertSeverity {
    pub fn prefix(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "[INFO]",
            AlertSeverity::Critical => "[CRITICAL]",
        }
    }
}

impl Alert {
    pub fn info(subject: &str, message: &str) -> Self {
        Self {
            severity: AlertSeverity::Info,
            subject: subject.to_string(),
            message: message.to_string(),
            details: None,
        }
    }

    pub fn critical(subject: &str, message: &str) -> Self {
        Self {
            severity: AlertSeverity::Critical,
            subject: subject.to_string(),
            message: message.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    /// Message followed by the diagnostic details, if any
    pub fn body(&self) -> String {
        match &self.details {
            Some(details) => format!("{}\n\n{}", self.message, details),
            None => self.message.clone(),
        }
    }
}

/// One delivery channel for alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &str;

    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Posts `{"text": ...}` to a Slack-compatible incoming webhook
pub struct SlackNotifier {
    client: Client,
    info_url: Option<String>,
    error_url: Option<String>,
}

impl SlackNotifier {
    pub fn new(client: Client, info_url: Option<String>, error_url: Option<String>) -> Self {
        Self {
            client,
            info_url,
            error_url,
        }
    }

    fn webhook_for(&self, severity: AlertSeverity) -> Option<&str> {
        match severity {
            AlertSeverity::Info => self.info_url.as_deref(),
            AlertSeverity::Critical => self.error_url.as_deref(),
        }
    }
}

/// `<prefix> <timestamp> <message>`
pub fn chat_text(alert: &Alert, now: DateTime<Utc>) -> String {
    format!(
        "{} {} {}",
        alert.severity.prefix(),
        now.format("%Y-%m-%d %H:%M:%S"),
        alert.body()
    )
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn channel(&self) -> &str {
        "slack"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        let Some(url) = self.webhook_for(alert.severity) else {
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .json(&json!({ "text": chat_text(alert, Utc::now()) }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "webhook returned non-success status: {}",
                response.status()
            ));
        }
        Ok(())
    }
}

pub struct EmailNotifier {
    smtp: SmtpConfig,
    sender: String,
    recipients: Vec<String>,
}

impl EmailNotifier {
    pub fn new(smtp: SmtpConfig, sender: String, recipients: Vec<String>) -> Self {
        Self {
            smtp,
            sender,
            recipients,
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &str {
        "email"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        let subject = format!("{} {}", alert.severity.prefix(), alert.subject);
        mail::send_mail(
            &self.smtp,
            &self.recipients,
            &self.sender,
            &subject,
            &alert.body(),
        )
        .await
        .map(|_| ())
        .ok_or_else(|| anyhow!("mail was not accepted by {}", self.smtp.host))
    }
}

/// Fans an alert out to every configured channel
pub struct AlertDispatcher {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl AlertDispatcher {
    pub fn with_notifiers(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn from_config(config: &MonitorConfig, client: &Client) -> Self {
        let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();

        if config.slack_webhook_info.is_some() || config.slack_webhook_error.is_some() {
            notifiers.push(Box::new(SlackNotifier::new(
                client.clone(),
                config.slack_webhook_info.clone(),
                config.slack_webhook_error.clone(),
            )));
        }

        if let Some(smtp) = &config.smtp {
            if !config.mail_to.is_empty() {
                notifiers.push(Box::new(EmailNotifier::new(
                    smtp.clone(),
                    config.mail_from.clone(),
                    config.mail_to.clone(),
                )));
            }
        }

        Self { notifiers }
    }

    pub fn channels(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.channel()).collect()
    }

    /// Log the alert and deliver it on every channel. Delivery failures
    /// are logged and dropped.
    pub async fn dispatch(&self, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Critical => error!(
                "ALERT {} {}: {} {}",
                alert.severity.prefix(),
                alert.subject,
                alert.message,
                alert.details.as_deref().unwrap_or("")
            ),
            AlertSeverity::Info => info!(
                "ALERT {} {}: {}",
                alert.severity.prefix(),
                alert.subject,
                alert.message
            ),
        }

        for notifier in &self.notifiers {
            match notifier.notify(alert).await {
                Ok(()) => debug!("Alert delivered via {}", notifier.channel()),
                Err(e) => warn!("Failed to deliver alert via {}: {}", notifier.channel(), e),
            }
        }
    }
}
