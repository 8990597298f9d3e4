use crate::error::{MonitorError, Result};
use crate::types::*;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Build the HTTP client shared by node probes and webhook posts
pub fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
        .timeout(timeout)
        .build()
}

/// Client for one node's HTTP API
#[derive(Clone, Debug)]
pub struct NodeClient {
    /// Base URL for the node, without trailing slash
    pub base_url: String,
    client: Client,
}

impl NodeClient {
    pub fn new(node_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: node_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Classify the node for this cycle. Never fails: anything short of
    /// a decodable status in CONSENSUS state is a skip.
    pub async fn probe(&self) -> ProbeOutcome {
        let url = format!("{}/", self.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::Skip(SkipReason::Unreachable(e.to_string())),
        };

        if !response.status().is_success() {
            return ProbeOutcome::Skip(SkipReason::HttpStatus(response.status().as_u16()));
        }

        let status: NodeStatus = match response.json::<StatusResponse>().await {
            Ok(body) => body.into(),
            Err(e) => return ProbeOutcome::Skip(SkipReason::Malformed(e.to_string())),
        };

        if status.state != CONSENSUS_STATE {
            return ProbeOutcome::Skip(SkipReason::NotInConsensus(status.state));
        }

        ProbeOutcome::Valid(status)
    }

    /// Fetch the block at `height`
    pub async fn block(&self, height: u64) -> Result<BlockRecord> {
        let url = format!("{}/api/v1/blocks/{}", self.base_url, height);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(MonitorError::HttpStatus {
                url,
                status: response.status().as_u16(),
            });
        }

        let payload: Value = response.json().await?;
        let block: BlockResponse = serde_json::from_value(payload.clone())?;
        let confirmed_at =
            parse_confirmed(&block.confirmed).map_err(|source| MonitorError::Timestamp {
                raw: block.confirmed.clone(),
                source,
            })?;

        Ok(BlockRecord {
            url: self.base_url.clone(),
            height: block.height,
            hash: block.hash,
            confirmed_at,
            round: block.round,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> NodeClient {
        let http = build_http_client(Duration::from_secs(2)).unwrap();
        NodeClient::new(format!("{}/", server.uri()), http)
    }

    #[test]
    fn test_url_normalization() {
        let client = NodeClient::new("http://localhost:12345/", Client::new());
        assert_eq!(client.base_url, "http://localhost:12345");
    }

    #[tokio::test]
    async fn test_probe_valid_node() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node": {"state": "CONSENSUS"},
                "block": {"height": 42, "total-txs": 50, "total-ops": 90}
            })))
            .mount(&server)
            .await;

        let outcome = client_for(&server).probe().await;
        assert_eq!(
            outcome,
            ProbeOutcome::Valid(NodeStatus {
                state: "CONSENSUS".to_string(),
                height: 42,
                total_txs: 50,
                total_ops: 90,
            })
        );
    }

    #[tokio::test]
    async fn test_probe_skips_syncing_node() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node": {"state": "SYNC"},
                "block": {"height": 3, "total-txs": 3, "total-ops": 6}
            })))
            .mount(&server)
            .await;

        let outcome = client_for(&server).probe().await;
        assert_eq!(
            outcome,
            ProbeOutcome::Skip(SkipReason::NotInConsensus("SYNC".to_string()))
        );
    }

    #[tokio::test]
    async fn test_probe_skips_error_status_and_bad_body() {
        let failing = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&failing)
            .await;
        assert_eq!(
            client_for(&failing).probe().await,
            ProbeOutcome::Skip(SkipReason::HttpStatus(503))
        );

        let garbled = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&garbled)
            .await;
        assert!(matches!(
            client_for(&garbled).probe().await,
            ProbeOutcome::Skip(SkipReason::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        let http = build_http_client(Duration::from_secs(1)).unwrap();
        let client = NodeClient::new("http://127.0.0.1:1", http);
        assert!(matches!(
            client.probe().await,
            ProbeOutcome::Skip(SkipReason::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/blocks/100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "height": 100,
                "hash": "abc",
                "round": 7,
                "confirmed": "2018-12-01T00:08:15.120000000Z",
                "proposer": "GDIRF4UWPACXPPI4GW7CMTACTCNDIKJEHZK44RITZB4TD3YUM6CCVNGJ"
            })))
            .mount(&server)
            .await;

        let block = client_for(&server).block(100).await.unwrap();
        assert_eq!(block.height, 100);
        assert_eq!(block.hash, "abc");
        assert_eq!(block.round, 7);
        assert_eq!(block.url, server.uri());
        assert_eq!(block.confirmed_at.to_string(), "2018-12-01 00:08:15");
        assert_eq!(
            block.payload["proposer"],
            "GDIRF4UWPACXPPI4GW7CMTACTCNDIKJEHZK44RITZB4TD3YUM6CCVNGJ"
        );
    }

    #[tokio::test]
    async fn test_fetch_block_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server).block(9).await.unwrap_err();
        assert!(matches!(err, MonitorError::HttpStatus { status: 404, .. }));
        assert!(!err.is_fatal());
    }
}
