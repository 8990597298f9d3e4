// Shared helpers: mock nodes and a recording alert channel
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use sebak_monitor::{Alert, AlertDispatcher, MonitorConfig, Notifier};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ANCHOR_CONFIRMED: &str = "2018-12-01T00:00:00.000000000Z";

/// Confirmation time of `height` when the chain runs `lag_secs` behind
/// a 5 second cadence anchored at height 2
pub fn confirmed_for(height: u64, lag_secs: i64) -> String {
    let anchor = chrono::DateTime::parse_from_rfc3339(ANCHOR_CONFIRMED).unwrap();
    let at = anchor + chrono::Duration::seconds((height as i64 - 2) * 5 + lag_secs);
    at.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

pub async fn mount_status(server: &MockServer, state: &str, height: u64) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "node": {"state": state, "alias": "node"},
            "block": {
                "height": height,
                "hash": "latest",
                "total-txs": height + 7,
                "total-ops": height * 2 + 9
            }
        })))
        .mount(server)
        .await;
}

pub async fn mount_block(server: &MockServer, height: u64, hash: &str, confirmed: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/blocks/{}", height)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "height": height,
            "hash": hash,
            "round": 3,
            "confirmed": confirmed,
            "proposer": "GDIRF4UWPACXPPI4GW7CMTACTCNDIKJEHZK44RITZB4TD3YUM6CCVNGJ"
        })))
        .mount(server)
        .await;
}

/// A node in CONSENSUS at `height` serving `hash`, plus the drift anchor
pub async fn consensus_node(height: u64, hash: &str) -> MockServer {
    let server = MockServer::start().await;
    mount_status(&server, "CONSENSUS", height).await;
    mount_block(&server, height, hash, &confirmed_for(height, 5)).await;
    mount_block(&server, 2, "anchor", ANCHOR_CONFIRMED).await;
    server
}

pub fn fast_config(servers: &[&MockServer]) -> MonitorConfig {
    MonitorConfig {
        checking_interval: Duration::ZERO,
        confirm_wait: Duration::ZERO,
        request_timeout: Duration::from_secs(2),
        endpoints: servers.iter().map(|s| format!("{}/", s.uri())).collect(),
        ..MonitorConfig::default()
    }
}

#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<(String, Alert)>>>);

impl Recorded {
    pub fn channels(&self) -> Vec<String> {
        self.0.lock().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.0.lock().iter().map(|(_, a)| a.clone()).collect()
    }
}

pub struct RecordingNotifier {
    name: &'static str,
    recorded: Recorded,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> &str {
        self.name
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        self.recorded
            .0
            .lock()
            .push((self.name.to_string(), alert.clone()));
        Ok(())
    }
}

/// Dispatcher with an email and a chat channel that only record
pub fn recording_dispatcher() -> (AlertDispatcher, Recorded) {
    let recorded = Recorded::default();
    let dispatcher = AlertDispatcher::with_notifiers(vec![
        Box::new(RecordingNotifier {
            name: "email",
            recorded: recorded.clone(),
        }),
        Box::new(RecordingNotifier {
            name: "slack",
            recorded: recorded.clone(),
        }),
    ]);
    (dispatcher, recorded)
}
