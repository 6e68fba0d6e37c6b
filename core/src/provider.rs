//! Multi-endpoint JSON-RPC provider with health tracking, per-endpoint rate
//! limiting and failover.
//!
//! Callers see a single `request` surface; endpoint failure, probing and
//! retry bookkeeping stay inside. Endpoints returning capacity/internal
//! error codes are taken out of rotation until a later health probe brings
//! them back.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;
use url::Url;

/// Error codes a node returns when it is out of capacity or internally
/// broken. These mark the endpoint unhealthy; other error codes only
/// trigger a retry elsewhere.
const UNHEALTHY_ERROR_CODES: &[i64] = &[-32000, -32603, -32002];

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("at least one rpc endpoint must be configured")]
    NoEndpoints,

    #[error("invalid rpc endpoint {0}: {1}")]
    InvalidEndpoint(String, String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    InvalidResponse(String),

    #[error("request failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum requests per second sent to a single endpoint.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_rate_limit() -> f64 {
    100.0
}
fn default_health_check_interval_secs() -> u64 {
    60
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            rate_limit: default_rate_limit(),
            health_check_interval_secs: default_health_check_interval_secs(),
        }
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug)]
struct EndpointState {
    healthy: bool,
    last_used: Option<Instant>,
    last_health_check: Option<Instant>,
}

#[derive(Debug)]
struct Endpoint {
    url: Url,
    state: Mutex<EndpointState>,
}

impl Endpoint {
    async fn mark_unhealthy(&self) {
        self.state.lock().await.healthy = false;
    }
}

/// Minimal block header view used for timestamp lookups.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlockHeader {
    pub number: U64,
    pub timestamp: U64,
}

/// Block with full transaction objects, used by the native transfer scan.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub number: U64,
    pub timestamp: U64,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub input: Bytes,
    pub block_number: Option<U64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: U64,
    pub transaction_hash: B256,
    pub log_index: Option<U64>,
}

#[derive(Debug)]
pub struct MultiNodeProvider {
    client: Client,
    endpoints: Vec<Endpoint>,
    max_retries: u32,
    min_request_gap: Duration,
    health_check_interval: Duration,
    request_id: AtomicU64,
}

impl MultiNodeProvider {
    pub fn new(endpoints: &[String], settings: &ProviderSettings) -> Result<Self, ProviderError> {
        if endpoints.is_empty() {
            return Err(ProviderError::NoEndpoints);
        }

        let parsed = endpoints
            .iter()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| ProviderError::InvalidEndpoint(raw.clone(), e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()?;

        let rate_limit = if settings.rate_limit > 0.0 { settings.rate_limit } else { 1.0 };

        Ok(Self {
            client,
            endpoints: parsed
                .into_iter()
                .map(|url| Endpoint {
                    url,
                    state: Mutex::new(EndpointState {
                        healthy: true,
                        last_used: None,
                        last_health_check: None,
                    }),
                })
                .collect(),
            max_retries: settings.max_retries.max(1),
            min_request_gap: Duration::from_secs_f64(1.0 / rate_limit),
            health_check_interval: Duration::from_secs(settings.health_check_interval_secs),
            request_id: AtomicU64::new(1),
        })
    }

    async fn send(&self, url: &Url, method: &str, params: &Value) -> Result<JsonRpcResponse, ProviderError> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self.client.post(url.clone()).json(&body).send().await?;
        let response = response.error_for_status()?;
        Ok(response.json::<JsonRpcResponse>().await?)
    }

    /// Probe an endpoint with `eth_blockNumber`. Healthy only when the node
    /// answers with a result.
    async fn probe(&self, url: &Url) -> bool {
        match self.send(url, "eth_blockNumber", &json!([])).await {
            Ok(response) => response.result.is_some(),
            Err(e) => {
                warn!("Node health check failed for {}: {}", url, e);
                false
            }
        }
    }

    /// Pick the next endpoint: shuffled order, skipping unhealthy and
    /// rate-limited entries, probing when the last health check is stale.
    async fn select_endpoint(&self) -> Option<usize> {
        let mut order: Vec<usize> = (0..self.endpoints.len()).collect();
        order.shuffle(&mut rand::rng());

        for idx in order {
            let endpoint = &self.endpoints[idx];
            let mut state = endpoint.state.lock().await;

            if !state.healthy {
                continue;
            }
            if let Some(last_used) = state.last_used {
                if last_used.elapsed() < self.min_request_gap {
                    continue;
                }
            }

            let check_is_stale = state
                .last_health_check
                .map_or(true, |checked| checked.elapsed() >= self.health_check_interval);
            if check_is_stale {
                if self.probe(&endpoint.url).await {
                    state.last_health_check = Some(Instant::now());
                } else {
                    state.healthy = false;
                    continue;
                }
            }

            state.last_used = Some(Instant::now());
            return Some(idx);
        }

        None
    }

    /// Make a JSON-RPC request, retrying across endpoints until one answers
    /// or `max_retries` attempts are spent. The last observed error
    /// surfaces when every attempt failed.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let mut attempts = 0u32;
        let mut last_error: Option<ProviderError> = None;

        while attempts < self.max_retries {
            let Some(idx) = self.select_endpoint().await else {
                tokio::time::sleep(self.min_request_gap).await;
                attempts += 1;
                continue;
            };
            let endpoint = &self.endpoints[idx];

            match self.send(&endpoint.url, method, &params).await {
                Ok(response) => {
                    if let Some(error) = response.error {
                        warn!(
                            "Node {} returned error for {}: {} (code {})",
                            endpoint.url, method, error.message, error.code
                        );
                        if UNHEALTHY_ERROR_CODES.contains(&error.code) {
                            endpoint.mark_unhealthy().await;
                        }
                        attempts += 1;
                        last_error =
                            Some(ProviderError::Rpc { code: error.code, message: error.message });
                        continue;
                    }

                    return Ok(response.result.unwrap_or(Value::Null));
                }
                Err(e) => {
                    warn!("Request to {} failed: {}. Retrying on another endpoint", endpoint.url, e);
                    endpoint.mark_unhealthy().await;
                    attempts += 1;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(ProviderError::RetriesExhausted { attempts }))
    }

    /// True when at least one endpoint is currently healthy and answering.
    pub async fn is_connected(&self) -> bool {
        for endpoint in &self.endpoints {
            {
                let state = endpoint.state.lock().await;
                if !state.healthy {
                    continue;
                }
            }
            if self.probe(&endpoint.url).await {
                let mut state = endpoint.state.lock().await;
                state.healthy = true;
                state.last_health_check = Some(Instant::now());
                return true;
            }
            endpoint.mark_unhealthy().await;
        }
        false
    }

    /// Health snapshot per endpoint, for stats logging and tests.
    pub async fn endpoint_health(&self) -> Vec<(String, bool)> {
        let mut snapshot = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            let state = endpoint.state.lock().await;
            snapshot.push((endpoint.url.to_string(), state.healthy));
        }
        snapshot
    }

    pub async fn get_block_number(&self) -> Result<u64, ProviderError> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&result)
    }

    pub async fn get_block_header(&self, number: u64) -> Result<Option<RpcBlockHeader>, ProviderError> {
        let result = self
            .request("eth_getBlockByNumber", json!([format!("{number:#x}"), false]))
            .await?;
        decode_optional(result)
    }

    pub async fn get_block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<RpcBlock>, ProviderError> {
        let result = self
            .request("eth_getBlockByNumber", json!([format!("{number:#x}"), true]))
            .await?;
        decode_optional(result)
    }

    pub async fn get_logs(&self, filter: Value) -> Result<Vec<RpcLog>, ProviderError> {
        let result = self.request("eth_getLogs", json!([filter])).await?;
        serde_json::from_value(result)
            .map_err(|e| ProviderError::InvalidResponse(format!("eth_getLogs: {e}")))
    }

    pub async fn get_transaction_by_hash(
        &self,
        hash: B256,
    ) -> Result<Option<RpcTransaction>, ProviderError> {
        let result = self.request("eth_getTransactionByHash", json!([hash])).await?;
        decode_optional(result)
    }

    pub async fn get_code(&self, address: Address) -> Result<Bytes, ProviderError> {
        let result = self.request("eth_getCode", json!([address, "latest"])).await?;
        serde_json::from_value(result)
            .map_err(|e| ProviderError::InvalidResponse(format!("eth_getCode: {e}")))
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256, ProviderError> {
        let result = self.request("eth_getBalance", json!([address, "latest"])).await?;
        serde_json::from_value(result)
            .map_err(|e| ProviderError::InvalidResponse(format!("eth_getBalance: {e}")))
    }

    pub async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        let result = self
            .request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| ProviderError::InvalidResponse(format!("eth_call: {e}")))
    }
}

fn decode_optional<T: serde::de::DeserializeOwned>(value: Value) -> Result<Option<T>, ProviderError> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

fn parse_quantity(value: &Value) -> Result<u64, ProviderError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ProviderError::InvalidResponse(format!("expected quantity, got {value}")))?;
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad quantity {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn settings(max_retries: u32) -> ProviderSettings {
        ProviderSettings {
            max_retries,
            timeout_secs: 2,
            rate_limit: 1000.0,
            health_check_interval_secs: 60,
        }
    }

    #[tokio::test]
    async fn fails_over_to_second_endpoint() {
        let mut bad = Server::new_async().await;
        let mut good = Server::new_async().await;

        let _bad_mock = bad.mock("POST", "/").with_status(500).create_async().await;
        let good_mock = good
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":123}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let provider =
            MultiNodeProvider::new(&[bad.url(), good.url()], &settings(3)).unwrap();

        // Whatever order the shuffle tries them in, the healthy endpoint
        // answers within max_retries attempts.
        let result = provider.request("eth_getBalance", serde_json::json!([])).await.unwrap();
        assert_eq!(result, serde_json::json!(123));

        good_mock.assert_async().await;

        // If the failing endpoint was probed at all, it must now be
        // unhealthy.
        let health = provider.endpoint_health().await;
        let good_entry = health.iter().find(|(url, _)| *url == good.url() + "/").unwrap();
        assert!(good_entry.1);
    }

    #[tokio::test]
    async fn transport_failure_marks_endpoint_unhealthy() {
        let mut server = Server::new_async().await;
        // Probes succeed but the real request breaks mid-flight.
        let _probe = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_blockNumber"}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
            .expect_at_least(1)
            .create_async()
            .await;
        let _broken = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_getBalance"}"#.to_string()))
            .with_status(502)
            .create_async()
            .await;

        let provider = MultiNodeProvider::new(&[server.url()], &settings(2)).unwrap();
        let error = provider.request("eth_getBalance", serde_json::json!([])).await.unwrap_err();

        assert!(matches!(error, ProviderError::Transport(_)));
        let health = provider.endpoint_health().await;
        assert!(!health[0].1, "transport failures must poison the endpoint");
    }

    #[tokio::test]
    async fn capacity_error_marks_endpoint_unhealthy() {
        let mut server = Server::new_async().await;

        // Probes succeed so the endpoint stays eligible for selection.
        let _probe = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_blockNumber"}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
            .expect_at_least(1)
            .create_async()
            .await;
        let _capacity = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_getBalance"}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"capacity"}}"#)
            .create_async()
            .await;

        let provider = MultiNodeProvider::new(&[server.url()], &settings(2)).unwrap();
        let error = provider.request("eth_getBalance", serde_json::json!([])).await.unwrap_err();

        assert!(matches!(error, ProviderError::Rpc { code: -32000, .. }));
        let health = provider.endpoint_health().await;
        assert!(!health[0].1);
    }

    #[tokio::test]
    async fn non_capacity_rpc_error_keeps_endpoint_healthy() {
        let mut server = Server::new_async().await;

        let _probe = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_blockNumber"}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
            .expect_at_least(1)
            .create_async()
            .await;
        let _method_missing = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_getBalance"}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#,
            )
            .create_async()
            .await;

        let provider = MultiNodeProvider::new(&[server.url()], &settings(2)).unwrap();
        let error = provider.request("eth_getBalance", serde_json::json!([])).await.unwrap_err();

        assert!(matches!(error, ProviderError::Rpc { code: -32601, .. }));
        let health = provider.endpoint_health().await;
        assert!(health[0].1, "non-capacity rpc errors must not poison the endpoint");
    }

    #[tokio::test]
    async fn typed_helpers_decode_wire_shapes() {
        let mut server = Server::new_async().await;

        let _block_number = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_blockNumber"}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x4d2"}"#)
            .expect_at_least(1)
            .create_async()
            .await;
        let _block = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(
                r#"{"method":"eth_getBlockByNumber"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"result":{
                    "number":"0x4d2","timestamp":"0x65f0a880",
                    "transactions":[{
                        "hash":"0x00000000000000000000000000000000000000000000000000000000000000aa",
                        "from":"0x1111111111111111111111111111111111111111",
                        "to":"0x2222222222222222222222222222222222222222",
                        "value":"0x1bc16d674ec80000",
                        "input":"0x",
                        "blockNumber":"0x4d2"
                    }]
                }}"#,
            )
            .create_async()
            .await;

        let provider = MultiNodeProvider::new(&[server.url()], &settings(3)).unwrap();

        assert_eq!(provider.get_block_number().await.unwrap(), 1234);

        let block = provider.get_block_with_transactions(1234).await.unwrap().unwrap();
        assert_eq!(block.number, U64::from(1234));
        assert_eq!(block.transactions.len(), 1);
        let tx = &block.transactions[0];
        assert_eq!(tx.to, Some("0x2222222222222222222222222222222222222222".parse().unwrap()));
        assert_eq!(tx.value, U256::from(2_000_000_000_000_000_000u128));
        assert!(tx.input.is_empty());
    }

    #[tokio::test]
    async fn missing_block_decodes_to_none() {
        let mut server = Server::new_async().await;
        let _probe = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_blockNumber"}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
            .expect_at_least(1)
            .create_async()
            .await;
        let _missing = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(
                r#"{"method":"eth_getBlockByNumber"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let provider = MultiNodeProvider::new(&[server.url()], &settings(3)).unwrap();
        assert!(provider.get_block_header(99).await.unwrap().is_none());
    }

    #[test]
    fn rejects_empty_endpoint_list() {
        let result = MultiNodeProvider::new(&[], &ProviderSettings::default());
        assert!(matches!(result, Err(ProviderError::NoEndpoints)));
    }
}
