use chrono::{DateTime, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Node state reported by a synced node taking part in consensus
pub const CONSENSUS_STATE: &str = "CONSENSUS";

/// Status snapshot served by a node's root resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub state: String,
    pub height: u64,
    pub total_txs: u64,
    pub total_ops: u64,
}

/// Block served by `/api/v1/blocks/<height>` on a single node
#[derive(Debug, Clone, Serialize)]
pub struct BlockRecord {
    /// Endpoint the block was fetched from
    pub url: String,
    pub height: u64,
    pub hash: String,
    pub confirmed_at: NaiveDateTime,
    pub round: u64,
    /// Raw response body, kept for alert diagnostics
    pub payload: Value,
}

impl BlockRecord {
    /// Host part of the endpoint, used to keep alert messages short
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| {
                u.host_str().map(|h| match u.port() {
                    Some(port) => format!("{}:{}", h, port),
                    None => h.to_string(),
                })
            })
            .unwrap_or_else(|| self.url.clone())
    }
}

/// Everything observed about the cluster in one check cycle
#[derive(Debug, Clone)]
pub struct ClusterSample {
    pub valid_endpoints: Vec<String>,
    pub reference_height: u64,
    pub reference_status: NodeStatus,
    /// One record per valid endpoint, in fetch order
    pub blocks: Vec<BlockRecord>,
}

impl ClusterSample {
    pub fn reference_block(&self) -> Option<&BlockRecord> {
        self.blocks.first()
    }
}

/// Result of probing one endpoint's status resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Valid(NodeStatus),
    Skip(SkipReason),
}

/// Why an endpoint was left out of a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Unreachable(String),
    HttpStatus(u16),
    Malformed(String),
    NotInConsensus(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreachable(e) => write!(f, "unreachable: {}", e),
            SkipReason::HttpStatus(code) => write!(f, "HTTP status {}", code),
            SkipReason::Malformed(e) => write!(f, "malformed status body: {}", e),
            SkipReason::NotInConsensus(state) => write!(f, "node state is {}", state),
        }
    }
}

// Wire types for the node HTTP API
#[derive(Deserialize)]
pub(crate) struct StatusResponse {
    node: NodeSection,
    block: BlockSection,
}

#[derive(Deserialize)]
struct NodeSection {
    state: String,
}

#[derive(Deserialize)]
struct BlockSection {
    height: u64,
    #[serde(rename = "total-txs")]
    total_txs: u64,
    #[serde(rename = "total-ops")]
    total_ops: u64,
}

impl From<StatusResponse> for NodeStatus {
    fn from(response: StatusResponse) -> Self {
        NodeStatus {
            state: response.node.state,
            height: response.block.height,
            total_txs: response.block.total_txs,
            total_ops: response.block.total_ops,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct BlockResponse {
    pub height: u64,
    pub hash: String,
    #[serde(default)]
    pub round: u64,
    pub confirmed: String,
}

/// Parse a node's `confirmed` timestamp, dropping fractional seconds.
///
/// Accepts RFC 3339 (normalized to UTC) and the bare
/// `YYYY-MM-DDTHH:MM:SS[.fraction]` form.
pub fn parse_confirmed(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc().trunc_subsecs(0));
    }
    let whole_seconds = raw.split('.').next().unwrap_or(raw);
    NaiveDateTime::parse_from_str(whole_seconds, "%Y-%m-%dT%H:%M:%S")
}
