// src/config.rs
// INI configuration loading and validation

use crate::drift::{
    DriftParams, DEFAULT_BLOCK_CADENCE_SECS, DEFAULT_REFERENCE_HEIGHT, MAX_BLOCK_CADENCE_SECS,
};
use crate::mail::SmtpConfig;
use anyhow::{Context, Result};
use chrono::TimeDelta;
use ini::Ini;
use log::{error, info, warn};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const SECTION_MONITOR: &str = "Monitor";
const SECTION_NODES: &str = "Nodes";
const SECTION_SLACK: &str = "Slack";
const SECTION_SMTP: &str = "SMTP";
const SECTION_EMAIL: &str = "Email";

const DEFAULT_CHECKING_SECS: u64 = 10;
const DEFAULT_CONFIRM_WAIT_SECS: u64 = 5;
const DEFAULT_ALARM_MINUTES: u64 = 60;
/// A year; anything longer silences status alerts for good
const MAX_ALARM_MINUTES: i64 = 525_600;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Time between the starts of two check cycles
    pub checking_interval: Duration,
    /// Delay before re-querying every node at the reference height
    pub confirm_wait: Duration,
    /// Minimum time between informational alerts
    pub alarm_interval: TimeDelta,
    pub request_timeout: Duration,
    pub drift: DriftParams,
    pub endpoints: Vec<String>,
    pub slack_webhook_info: Option<String>,
    pub slack_webhook_error: Option<String>,
    pub smtp: Option<SmtpConfig>,
    pub mail_from: String,
    pub mail_to: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            checking_interval: Duration::from_secs(DEFAULT_CHECKING_SECS),
            confirm_wait: Duration::from_secs(DEFAULT_CONFIRM_WAIT_SECS),
            alarm_interval: TimeDelta::minutes(DEFAULT_ALARM_MINUTES as i64),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            drift: DriftParams::default(),
            endpoints: vec![],
            slack_webhook_info: None,
            slack_webhook_error: None,
            smtp: None,
            mail_from: String::new(),
            mail_to: vec![],
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        Self::from_ini(&ini)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let ini = Ini::load_from_str(contents).context("Failed to parse configuration")?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self> {
        let checking_secs = number(ini, SECTION_MONITOR, "CheckingBlock", DEFAULT_CHECKING_SECS)?;
        let confirm_secs =
            number(ini, SECTION_MONITOR, "BlockConfirmWait", DEFAULT_CONFIRM_WAIT_SECS)?;
        let alarm_minutes = number(ini, SECTION_MONITOR, "Alarm", DEFAULT_ALARM_MINUTES)?;
        let alarm_interval = alarm_minutes
            .checked_mul(60)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(TimeDelta::try_seconds)
            .with_context(|| {
                format!("Value {} for [{}] Alarm is out of range", alarm_minutes, SECTION_MONITOR)
            })?;
        let timeout_secs =
            number(ini, SECTION_MONITOR, "RequestTimeout", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let request_timeout = Duration::from_secs(timeout_secs);

        let drift = DriftParams {
            cadence_secs: number(
                ini,
                SECTION_MONITOR,
                "BlockCadence",
                DEFAULT_BLOCK_CADENCE_SECS,
            )?,
            reference_height: number(
                ini,
                SECTION_MONITOR,
                "DriftReferenceHeight",
                DEFAULT_REFERENCE_HEIGHT,
            )?,
        };

        let smtp = match value(ini, SECTION_SMTP, "Host") {
            Some(host) => Some(SmtpConfig {
                host: host.to_string(),
                port: number(ini, SECTION_SMTP, "Port", DEFAULT_SMTP_PORT)?,
                user: value(ini, SECTION_SMTP, "User").map(str::to_string),
                password: value(ini, SECTION_SMTP, "Password").map(str::to_string),
                timeout: request_timeout,
            }),
            None => None,
        };

        Ok(Self {
            checking_interval: Duration::from_secs(checking_secs),
            confirm_wait: Duration::from_secs(confirm_secs),
            alarm_interval,
            request_timeout,
            drift,
            endpoints: list(ini, SECTION_NODES, "Endpoints"),
            slack_webhook_info: value(ini, SECTION_SLACK, "SlackWebhookInfo").map(str::to_string),
            slack_webhook_error: value(ini, SECTION_SLACK, "SlackWebhookError").map(str::to_string),
            smtp,
            mail_from: value(ini, SECTION_EMAIL, "From").unwrap_or_default().to_string(),
            mail_to: list(ini, SECTION_EMAIL, "To"),
        })
    }

    /// The confirmation wait is spent inside the cycle
    pub fn sleep_after_cycle(&self) -> Duration {
        self.checking_interval.saturating_sub(self.confirm_wait)
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::default();

        validate_endpoints(self, &mut validation);
        validate_timing(self, &mut validation);
        validate_alerting(self, &mut validation);

        validation
    }
}

fn value<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|props| props.get(key))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn number<T: FromStr>(ini: &Ini, section: &str, key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value(ini, section, key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value {:?} for [{}] {}", raw, section, key)),
        None => Ok(default),
    }
}

// Comma-separated list, blanks dropped
fn list(ini: &Ini, section: &str, key: &str) -> Vec<String> {
    value(ini, section, key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Findings of `MonitorConfig::validate`. Any error makes the file unusable.
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn reject(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Log each finding against the file it was read from
    pub fn log(&self, source: &Path) {
        let source = source.display();
        for w in &self.warnings {
            warn!("{}: {}", source, w);
        }
        for e in &self.errors {
            error!("{}: {}", source, e);
        }
        if self.is_valid() {
            info!("{} accepted ({} warning(s))", source, self.warnings.len());
        } else {
            error!("{} rejected with {} error(s)", source, self.errors.len());
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

fn validate_endpoints(config: &MonitorConfig, validation: &mut ConfigValidation) {
    if config.endpoints.is_empty() {
        validation.reject("[Nodes] Endpoints lists no node to monitor");
        return;
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        if !is_http_url(endpoint) {
            validation.reject(format!("Endpoint {:?} is not an http(s) URL", endpoint));
        }
        if !seen.insert(endpoint.trim_end_matches('/')) {
            validation.warn(format!("Endpoint {} is listed more than once", endpoint));
        }
    }
}

fn validate_timing(config: &MonitorConfig, validation: &mut ConfigValidation) {
    if config.checking_interval.is_zero() {
        validation.warn("CheckingBlock is 0 - cycles will run back to back");
    }
    if config.confirm_wait > config.checking_interval {
        validation.warn(format!(
            "BlockConfirmWait ({}s) exceeds CheckingBlock ({}s) - cycles will overrun",
            config.confirm_wait.as_secs(),
            config.checking_interval.as_secs()
        ));
    }
    if config.request_timeout.is_zero() {
        validation.reject("RequestTimeout must be at least 1 second");
    }
    if config.drift.cadence_secs <= 0 {
        validation.reject(format!(
            "BlockCadence must be positive (got {})",
            config.drift.cadence_secs
        ));
    } else if config.drift.cadence_secs > MAX_BLOCK_CADENCE_SECS {
        validation.reject(format!(
            "BlockCadence {}s exceeds the {}s maximum",
            config.drift.cadence_secs, MAX_BLOCK_CADENCE_SECS
        ));
    }
    if i64::try_from(config.drift.reference_height).is_err() {
        validation.reject(format!(
            "DriftReferenceHeight {} is beyond any reachable height",
            config.drift.reference_height
        ));
    }
    if config.alarm_interval > TimeDelta::minutes(MAX_ALARM_MINUTES) {
        validation.reject(format!(
            "Alarm {} minutes exceeds the {} minute maximum",
            config.alarm_interval.num_minutes(),
            MAX_ALARM_MINUTES
        ));
    }
}

fn validate_alerting(config: &MonitorConfig, validation: &mut ConfigValidation) {
    for (key, hook) in [
        ("SlackWebhookInfo", &config.slack_webhook_info),
        ("SlackWebhookError", &config.slack_webhook_error),
    ] {
        if let Some(url) = hook {
            if !is_http_url(url) {
                validation.reject(format!("{} {:?} is not an http(s) URL", key, url));
            }
        }
    }

    match &config.smtp {
        Some(_) => {
            if config.mail_from.is_empty() {
                validation.reject("[SMTP] Host is set but [Email] From is empty");
            }
            if config.mail_to.is_empty() {
                validation.warn("[Email] To is empty - mail alerts are disabled");
            }
        }
        None => {
            if config.slack_webhook_error.is_none() {
                validation.warn(
                    "No SMTP host or SlackWebhookError - critical alerts will only be logged",
                );
            }
        }
    }
}
