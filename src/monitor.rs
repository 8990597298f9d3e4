// src/monitor.rs
// The check loop: sample, wait, verify agreement, report, sleep

use crate::alerts::{Alert, AlertDispatcher};
use crate::client::build_http_client;
use crate::config::MonitorConfig;
use crate::drift::{format_drift, measure_drift};
use crate::error::{MonitorError, Result};
use crate::sampler::{check_agreement, fetch_blocks, select_reference, ClusterSampler};
use crate::types::ClusterSample;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use std::fmt;
use std::path::PathBuf;

/// Mutable state carried from one cycle to the next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorState {
    pub previous_height: u64,
    pub last_alarm_at: DateTime<Utc>,
}

impl MonitorState {
    /// Back-dated so the first successful cycle always alarms
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            previous_height: 0,
            last_alarm_at: now - Duration::days(1),
        }
    }

    pub fn alarm_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        now - self.last_alarm_at >= interval
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Sampling,
    WaitingConfirm,
    CheckingAgreement,
    Reporting,
    Sleeping,
    Halted,
}

/// Summary of one successful cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub nodes: usize,
    pub height: u64,
    pub round: u64,
    /// Transactions minus the one system transaction per block
    pub user_txs: i64,
    /// Operations minus the two system operations per block
    pub user_ops: i64,
    pub drift: Option<Duration>,
}

impl CycleReport {
    pub fn from_sample(sample: &ClusterSample, drift: Option<Duration>) -> Self {
        let height = sample.reference_height;
        let status = &sample.reference_status;
        Self {
            nodes: sample.valid_endpoints.len(),
            height,
            round: sample.reference_block().map(|b| b.round).unwrap_or_default(),
            user_txs: status.total_txs as i64 - height as i64,
            user_ops: status.total_ops as i64 - (height as i64) * 2,
            drift,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes: {}, height: {}, round: {}, user-txs: {}, user-ops: {}, time-diff: {}",
            self.nodes,
            self.height,
            self.round,
            self.user_txs,
            self.user_ops,
            self.drift.map(format_drift).unwrap_or_else(|| "n/a".to_string())
        )
    }
}

pub struct Monitor {
    config: MonitorConfig,
    config_path: Option<PathBuf>,
    http: Client,
    dispatcher: AlertDispatcher,
    pinned_dispatcher: bool,
    state: MonitorState,
    phase: Phase,
}

impl Monitor {
    /// `config_path`, when given, is re-read at the top of every cycle
    pub fn new(config: MonitorConfig, config_path: Option<PathBuf>) -> Result<Self> {
        let http = build_http_client(config.request_timeout)?;
        let dispatcher = AlertDispatcher::from_config(&config, &http);
        Ok(Self {
            config,
            config_path,
            http,
            dispatcher,
            pinned_dispatcher: false,
            state: MonitorState::new(Utc::now()),
            phase: Phase::Sampling,
        })
    }

    /// Use a fixed dispatcher instead of the one derived from configuration
    pub fn with_dispatcher(mut self, dispatcher: AlertDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self.pinned_dispatcher = true;
        self
    }

    pub fn with_state(mut self, state: MonitorState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn dispatcher_channels(&self) -> Vec<&str> {
        self.dispatcher.channels()
    }

    fn enter(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Re-read configuration; a broken file keeps the previous settings
    async fn reload_config(&mut self) {
        let Some(path) = &self.config_path else {
            return;
        };

        let config = match MonitorConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Keeping previous configuration: {:#}", e);
                return;
            }
        };
        let validation = config.validate();
        if !validation.is_valid() {
            validation.log(path);
            warn!("Keeping previous configuration: {} has errors", path.display());
            return;
        }
        if config == self.config {
            return;
        }

        info!("Configuration reloaded from {}", path.display());
        if config.request_timeout != self.config.request_timeout {
            match build_http_client(config.request_timeout) {
                Ok(http) => self.http = http,
                Err(e) => warn!("Keeping previous HTTP client: {}", e),
            }
        }
        if !self.pinned_dispatcher {
            self.dispatcher = AlertDispatcher::from_config(&config, &self.http);
        }
        self.config = config;
    }

    /// Run one check cycle, updating state only on success
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.enter(Phase::Sampling);
        let sampler = ClusterSampler::new(&self.config.endpoints, &self.http);
        let valid = sampler.valid_nodes().await;
        debug!(
            "{}/{} endpoints in consensus",
            valid.len(),
            sampler.endpoint_count()
        );

        let reference = select_reference(
            &valid,
            self.state.previous_height,
            self.config.checking_interval.as_secs(),
        )?;
        let height = reference.status.height;
        let reference_status = reference.status.clone();
        let reference_client = reference.client.clone();

        self.enter(Phase::WaitingConfirm);
        tokio::time::sleep(self.config.confirm_wait).await;

        self.enter(Phase::CheckingAgreement);
        let blocks = fetch_blocks(&valid, height).await?;
        check_agreement(&blocks)?;

        self.enter(Phase::Reporting);
        let sample = ClusterSample {
            valid_endpoints: valid.iter().map(|n| n.client.base_url.clone()).collect(),
            reference_height: height,
            reference_status,
            blocks,
        };

        let drift = match sample.reference_block() {
            Some(latest) => {
                match measure_drift(&reference_client, &self.config.drift, latest).await {
                    Ok(drift) => Some(drift),
                    Err(e) => {
                        warn!("Drift unavailable: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let report = CycleReport::from_sample(&sample, drift);
        self.state.previous_height = height;
        info!("{}", report);

        let now = Utc::now();
        if self.state.alarm_due(now, self.config.alarm_interval) {
            let alert = Alert::info("sebak-monitor status", &report.to_string());
            self.dispatcher.dispatch(&alert).await;
            self.state.last_alarm_at = now;
        }

        Ok(report)
    }

    /// Send the critical alert for `error` and stop
    async fn halt(&mut self, error: &MonitorError) {
        self.enter(Phase::Halted);
        let subject = format!("sebak-monitor: {}", error.kind());
        let mut alert = Alert::critical(&subject, &error.to_string());
        if let Some(details) = error.diagnostics() {
            alert = alert.with_details(details);
        }
        self.dispatcher.dispatch(&alert).await;
    }

    /// Single cycle; a fatal violation is alerted before being returned
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        match self.run_cycle().await {
            Err(e) if e.is_fatal() => {
                self.halt(&e).await;
                Err(e)
            }
            other => other,
        }
    }

    /// Loop until a fatal violation, which is returned after alerting.
    /// Transient failures restart the cycle without advancing state.
    pub async fn run(&mut self) -> MonitorError {
        loop {
            self.reload_config().await;

            match self.run_cycle().await {
                Ok(_) => {
                    self.enter(Phase::Sleeping);
                    tokio::time::sleep(self.config.sleep_after_cycle()).await;
                }
                Err(e) if e.is_fatal() => {
                    self.halt(&e).await;
                    return e;
                }
                Err(e) => {
                    warn!("Cycle failed, retrying: {}", e);
                }
            }
        }
    }
}
