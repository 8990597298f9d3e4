pub mod alerts;
pub mod client;
pub mod config;
pub mod drift;
pub mod error;
pub mod mail;
pub mod monitor;
pub mod sampler;
pub mod types;

pub use alerts::{Alert, AlertDispatcher, AlertSeverity, Notifier};
pub use client::NodeClient;
pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use monitor::{CycleReport, Monitor, MonitorState, Phase};
pub use types::*;

use anyhow::{bail, Context};
use log::{error, info};
use std::path::Path;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load the configuration at `config_path` and monitor until a fatal
/// violation halts the loop. With `once`, run a single cycle instead.
pub async fn run(config_path: &Path, once: bool) -> anyhow::Result<()> {
    let config = MonitorConfig::load(config_path)?;
    let validation = config.validate();
    validation.log(config_path);
    if !validation.is_valid() {
        bail!("Configuration {} is invalid", config_path.display());
    }

    info!(
        "sebak-monitor {} watching {} endpoint(s), cycle {}s, confirm wait {}s",
        VERSION,
        config.endpoints.len(),
        config.checking_interval.as_secs(),
        config.confirm_wait.as_secs()
    );

    let mut monitor = Monitor::new(config, Some(config_path.to_path_buf()))
        .context("Failed to initialize monitor")?;
    info!("Alert channels: {:?}", monitor.dispatcher_channels());

    if once {
        let report = monitor.run_once().await?;
        info!("Check passed: {}", report);
        return Ok(());
    }

    let reason = monitor.run().await;
    error!("Monitor halted: {}", reason);
    Ok(())
}
