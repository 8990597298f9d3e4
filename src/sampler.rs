// Cluster sampling, reference height selection and cross-node agreement

use crate::client::NodeClient;
use crate::error::{MonitorError, Result};
use crate::types::*;
use futures::future::{join_all, try_join_all};
use log::debug;
use reqwest::Client;

/// A node that passed the status probe this cycle
#[derive(Debug, Clone)]
pub struct ValidNode {
    pub client: NodeClient,
    pub status: NodeStatus,
}

/// Fans the status probe out over every configured endpoint
pub struct ClusterSampler {
    nodes: Vec<NodeClient>,
}

impl ClusterSampler {
    pub fn new(endpoints: &[String], http: &Client) -> Self {
        Self {
            nodes: endpoints
                .iter()
                .map(|url| NodeClient::new(url.as_str(), http.clone()))
                .collect(),
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.nodes.len()
    }

    /// Probe all endpoints concurrently; outcomes keep configuration order
    pub async fn probe_all(&self) -> Vec<ProbeOutcome> {
        join_all(self.nodes.iter().map(|node| node.probe())).await
    }

    /// Endpoints in CONSENSUS state, in configuration order
    pub async fn valid_nodes(&self) -> Vec<ValidNode> {
        let outcomes = self.probe_all().await;
        self.nodes
            .iter()
            .zip(outcomes)
            .filter_map(|(node, outcome)| match outcome {
                ProbeOutcome::Valid(status) => Some(ValidNode {
                    client: node.clone(),
                    status,
                }),
                ProbeOutcome::Skip(reason) => {
                    debug!("Skipping {}: {}", node.base_url, reason);
                    None
                }
            })
            .collect()
    }
}

/// Pick the first valid node as the reference and check its height
/// against the previous cycle.
pub fn select_reference(
    valid: &[ValidNode],
    previous_height: u64,
    interval_secs: u64,
) -> Result<&ValidNode> {
    let reference = valid.first().ok_or(MonitorError::NoValidNodes)?;
    let height = reference.status.height;

    if height == previous_height {
        return Err(MonitorError::StalledHeight {
            height,
            interval_secs,
        });
    }
    if height < 1 {
        return Err(MonitorError::InvalidHeight(height));
    }

    Ok(reference)
}

/// Fetch the block at `height` from every node at once. Any failed
/// fetch fails the batch: agreement is never judged on a partial set.
pub async fn fetch_blocks(nodes: &[ValidNode], height: u64) -> Result<Vec<BlockRecord>> {
    try_join_all(nodes.iter().map(|node| node.client.block(height))).await
}

/// Every record must match the first one in fetch order
pub fn check_agreement(blocks: &[BlockRecord]) -> Result<()> {
    let Some(reference) = blocks.first() else {
        return Ok(());
    };

    for block in &blocks[1..] {
        if block.height != reference.height {
            return Err(MonitorError::HeightDisagreement {
                reference: Box::new(reference.clone()),
                divergent: Box::new(block.clone()),
            });
        }
        if block.hash != reference.hash {
            return Err(MonitorError::HashDisagreement {
                reference: Box::new(reference.clone()),
                divergent: Box::new(block.clone()),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn block(url: &str, height: u64, hash: &str) -> BlockRecord {
        BlockRecord {
            url: url.to_string(),
            height,
            hash: hash.to_string(),
            confirmed_at: NaiveDate::from_ymd_opt(2018, 12, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            round: 0,
            payload: json!({"height": height, "hash": hash}),
        }
    }

    fn valid(url: &str, height: u64) -> ValidNode {
        ValidNode {
            client: NodeClient::new(url, Client::new()),
            status: NodeStatus {
                state: CONSENSUS_STATE.to_string(),
                height,
                total_txs: height,
                total_ops: height * 2,
            },
        }
    }

    #[test]
    fn test_agreement_when_all_hashes_match() {
        let blocks = vec![
            block("http://a", 100, "abc"),
            block("http://b", 100, "abc"),
            block("http://c", 100, "abc"),
        ];
        assert!(check_agreement(&blocks).is_ok());
        assert!(check_agreement(&blocks[..1]).is_ok());
        assert!(check_agreement(&[]).is_ok());
    }

    #[test]
    fn test_first_divergent_pair_is_reported() {
        let blocks = vec![
            block("http://a", 100, "abc"),
            block("http://b", 100, "xyz"),
            block("http://c", 100, "def"),
        ];
        match check_agreement(&blocks) {
            Err(MonitorError::HashDisagreement {
                reference,
                divergent,
            }) => {
                assert_eq!(reference.url, "http://a");
                assert_eq!(divergent.url, "http://b");
                assert_eq!(divergent.hash, "xyz");
            }
            other => panic!("expected hash disagreement, got {:?}", other),
        }
    }

    #[test]
    fn test_reference_is_first_record_not_majority() {
        // The odd one out is the reference, so the first follower is blamed
        let blocks = vec![
            block("http://a", 100, "xyz"),
            block("http://b", 100, "abc"),
            block("http://c", 100, "abc"),
        ];
        match check_agreement(&blocks) {
            Err(MonitorError::HashDisagreement { divergent, .. }) => {
                assert_eq!(divergent.url, "http://b");
            }
            other => panic!("expected hash disagreement, got {:?}", other),
        }
    }

    #[test]
    fn test_height_disagreement() {
        let blocks = vec![block("http://a", 100, "abc"), block("http://b", 99, "abc")];
        assert!(matches!(
            check_agreement(&blocks),
            Err(MonitorError::HeightDisagreement { .. })
        ));
    }

    #[test]
    fn test_select_reference_uses_list_order() {
        let nodes = vec![valid("http://a", 10), valid("http://b", 12)];
        let reference = select_reference(&nodes, 9, 10).unwrap();
        assert_eq!(reference.client.base_url, "http://a");
        assert_eq!(reference.status.height, 10);
    }

    #[test]
    fn test_select_reference_errors() {
        assert!(matches!(
            select_reference(&[], 0, 10),
            Err(MonitorError::NoValidNodes)
        ));

        let nodes = vec![valid("http://a", 50)];
        assert!(matches!(
            select_reference(&nodes, 50, 10),
            Err(MonitorError::StalledHeight {
                height: 50,
                interval_secs: 10
            })
        ));

        let genesis = vec![valid("http://a", 0)];
        assert!(matches!(
            select_reference(&genesis, 3, 10),
            Err(MonitorError::InvalidHeight(0))
        ));
    }

    #[test]
    fn test_consecutive_equal_heights_stall() {
        let observed = [5u64, 6, 7, 7, 8];
        let mut previous = 0;
        let mut stalled_at = None;
        for (cycle, height) in observed.iter().enumerate() {
            let nodes = vec![valid("http://a", *height)];
            match select_reference(&nodes, previous, 10) {
                Ok(node) => previous = node.status.height,
                Err(MonitorError::StalledHeight { .. }) => {
                    stalled_at = Some(cycle);
                    break;
                }
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(stalled_at, Some(3));
    }
}
