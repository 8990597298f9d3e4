// Drift between the nominal block cadence and actual confirmation times

use crate::client::NodeClient;
use crate::error::{MonitorError, Result};
use crate::types::BlockRecord;
use chrono::{Duration, NaiveDateTime};

pub const DEFAULT_BLOCK_CADENCE_SECS: i64 = 5;
pub const DEFAULT_REFERENCE_HEIGHT: u64 = 2;
/// One block per day is the slowest cadence accepted from configuration
pub const MAX_BLOCK_CADENCE_SECS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftParams {
    /// Seconds the network is expected to spend per height
    pub cadence_secs: i64,
    /// Early block whose confirmation time anchors the estimate
    pub reference_height: u64,
}

impl Default for DriftParams {
    fn default() -> Self {
        Self {
            cadence_secs: DEFAULT_BLOCK_CADENCE_SECS,
            reference_height: DEFAULT_REFERENCE_HEIGHT,
        }
    }
}

impl DriftParams {
    /// When `latest_height` should have been confirmed at nominal cadence.
    /// `None` when the offset does not fit a timestamp.
    pub fn expected_time(
        &self,
        first_block_time: NaiveDateTime,
        latest_height: u64,
    ) -> Option<NaiveDateTime> {
        let latest = i64::try_from(latest_height).ok()?;
        let reference = i64::try_from(self.reference_height).ok()?;
        let offset = latest
            .checked_sub(reference)?
            .checked_mul(self.cadence_secs)
            .and_then(Duration::try_seconds)?;
        first_block_time.checked_add_signed(offset)
    }

    /// Positive when the chain runs behind the nominal cadence
    pub fn drift(
        &self,
        first_block_time: NaiveDateTime,
        latest_height: u64,
        actual: NaiveDateTime,
    ) -> Option<Duration> {
        self.expected_time(first_block_time, latest_height)
            .map(|expected| actual - expected)
    }
}

/// Estimate drift for `latest`, fetching the anchor block from `node`
pub async fn measure_drift(
    node: &NodeClient,
    params: &DriftParams,
    latest: &BlockRecord,
) -> Result<Duration> {
    let first = node.block(params.reference_height).await?;
    params
        .drift(first.confirmed_at, latest.height, latest.confirmed_at)
        .ok_or(MonitorError::DriftOutOfRange {
            height: latest.height,
            cadence_secs: params.cadence_secs,
        })
}

pub fn format_drift(drift: Duration) -> String {
    let secs = drift.num_seconds();
    if secs < 0 {
        format!("-{}s", -secs)
    } else {
        format!("+{}s", secs)
    }
}
