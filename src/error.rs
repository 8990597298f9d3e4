use crate::types::BlockRecord;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid confirmed timestamp {raw:?}: {source}")]
    Timestamp {
        raw: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Drift for height {height} at {cadence_secs}s per block is out of range")]
    DriftOutOfRange { height: u64, cadence_secs: i64 },

    #[error("There is no valid node in CONSENSUS state")]
    NoValidNodes,

    #[error("The latest height({height}) is not changed for {interval_secs} seconds")]
    StalledHeight { height: u64, interval_secs: u64 },

    #[error("The latest height({0}) is invalid")]
    InvalidHeight(u64),

    #[error(
        "In {}, height({}) is different with {}(height:{})",
        .divergent.host(), .divergent.height, .reference.host(), .reference.height
    )]
    HeightDisagreement {
        reference: Box<BlockRecord>,
        divergent: Box<BlockRecord>,
    },

    #[error(
        "In {}, block-hash({}) is different with {}(hash:{}) at height {}",
        .divergent.host(), .divergent.hash, .reference.host(), .reference.hash, .reference.height
    )]
    HashDisagreement {
        reference: Box<BlockRecord>,
        divergent: Box<BlockRecord>,
    },
}

impl MonitorError {
    /// Liveness and consistency violations halt the monitor; everything
    /// else is retried on the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MonitorError::NoValidNodes
                | MonitorError::StalledHeight { .. }
                | MonitorError::InvalidHeight(_)
                | MonitorError::HeightDisagreement { .. }
                | MonitorError::HashDisagreement { .. }
        )
    }

    /// Short label used as the alert subject
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Network(_) => "network error",
            MonitorError::Serialization(_) => "malformed response",
            MonitorError::HttpStatus { .. } => "http error",
            MonitorError::Timestamp { .. } => "malformed timestamp",
            MonitorError::DriftOutOfRange { .. } => "drift out of range",
            MonitorError::NoValidNodes => "no valid nodes",
            MonitorError::StalledHeight { .. } => "stalled height",
            MonitorError::InvalidHeight(_) => "invalid height",
            MonitorError::HeightDisagreement { .. } => "height disagreement",
            MonitorError::HashDisagreement { .. } => "hash disagreement",
        }
    }

    /// Full payloads of both conflicting blocks, for the alert body
    pub fn diagnostics(&self) -> Option<String> {
        match self {
            MonitorError::HeightDisagreement {
                reference,
                divergent,
            }
            | MonitorError::HashDisagreement {
                reference,
                divergent,
            } => Some(format!(
                "reference block from {}:\n{}\n\ndivergent block from {}:\n{}",
                reference.url,
                pretty(&reference.payload),
                divergent.url,
                pretty(&divergent.payload)
            )),
            _ => None,
        }
    }
}

fn pretty(payload: &serde_json::Value) -> String {
    serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
}
