//! Generic contract event collector: the same cursor/polling skeleton as
//! the token transfer collector, scoped to a single contract. Emits opaque
//! [`Web3LogEvent`]s carrying the raw log for downstream decoding.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use alloy::primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::{Collector, CollectorError};
use crate::{
    provider::{MultiNodeProvider, ProviderSettings},
    storage::StateStore,
    types::{Event, Web3LogEvent},
};

pub const COMPONENT_NAME: &str = "web3_event";

#[derive(Debug, Clone, Deserialize)]
pub struct Web3EventCollectorConfig {
    pub chain_id: u64,
    pub rpc_endpoints: Vec<String>,
    /// The single contract to monitor.
    pub contract_address: Address,
    /// Optional event signatures to filter on, e.g.
    /// `Transfer(address,address,uint256)`. All events when empty.
    #[serde(default)]
    pub event_signatures: Vec<String>,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    #[serde(default = "default_max_blocks_per_scan")]
    pub max_blocks_per_scan: u64,
    #[serde(default)]
    pub start_block: Option<u64>,
    #[serde(default = "default_state_dir")]
    pub state_dir: std::path::PathBuf,
    #[serde(default)]
    pub provider: ProviderSettings,
}

fn default_polling_interval() -> u64 {
    15
}
fn default_max_blocks_per_scan() -> u64 {
    100
}
fn default_state_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("data/state")
}

struct Inner {
    chain_id: u64,
    contract_address: Address,
    topic_filter: Vec<B256>,
    polling_interval: Duration,
    max_blocks_per_scan: u64,
    start_block: Option<u64>,
    state_dir: std::path::PathBuf,
    provider: Arc<MultiNodeProvider>,
    state_store: RwLock<Option<StateStore>>,
    cursor: RwLock<Option<u64>>,
    running: AtomicBool,
    started: AtomicBool,
}

pub struct Web3EventCollector {
    inner: Arc<Inner>,
}

impl Web3EventCollector {
    pub fn new(config: Web3EventCollectorConfig) -> Result<Self, CollectorError> {
        if config.rpc_endpoints.is_empty() {
            return Err(CollectorError::Config(
                "at least one rpc endpoint must be provided".to_string(),
            ));
        }

        let provider = MultiNodeProvider::new(&config.rpc_endpoints, &config.provider)?;
        let topic_filter = config
            .event_signatures
            .iter()
            .map(|signature| keccak256(signature.as_bytes()))
            .collect();

        Ok(Self {
            inner: Arc::new(Inner {
                chain_id: config.chain_id,
                contract_address: config.contract_address,
                topic_filter,
                polling_interval: Duration::from_secs(config.polling_interval_secs),
                max_blocks_per_scan: config.max_blocks_per_scan.max(1),
                start_block: config.start_block,
                state_dir: config.state_dir,
                provider: Arc::new(provider),
                state_store: RwLock::new(None),
                cursor: RwLock::new(None),
                running: AtomicBool::new(false),
                started: AtomicBool::new(false),
            }),
        })
    }

    #[cfg(test)]
    pub(crate) async fn cursor(&self) -> Option<u64> {
        *self.inner.cursor.read().await
    }

    #[cfg(test)]
    pub(crate) async fn run_cycle(&self, tx: &mpsc::Sender<Event>) {
        if let Err(e) = self.inner.scan(tx).await {
            error!("Error collecting web3 events: {e}");
        }
    }
}

#[async_trait]
impl Collector for Web3EventCollector {
    fn name(&self) -> &'static str {
        COMPONENT_NAME
    }

    async fn start(&self) -> Result<(), CollectorError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.running.store(true, Ordering::SeqCst);

        let store = StateStore::open(&self.inner.state_dir).await?;
        *self.inner.state_store.write().await = Some(store);
        self.inner.initialize_cursor().await;

        if !self.inner.provider.is_connected().await {
            warn!("Unable to connect to chain {}", self.inner.chain_id);
        }

        info!("Collector {COMPONENT_NAME} started for contract {}", self.inner.contract_address);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CollectorError> {
        if !self.inner.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.running.store(false, Ordering::SeqCst);

        if let Some(store) = self.inner.state_store.write().await.take() {
            store.close();
        }

        info!("Collector {COMPONENT_NAME} stopped");
        Ok(())
    }

    fn events(&self) -> ReceiverStream<Event> {
        let (tx, rx) = mpsc::channel(1024);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            while inner.running.load(Ordering::SeqCst) {
                if let Err(e) = inner.scan(&tx).await {
                    error!("Error collecting web3 events: {e}");
                }

                if tx.is_closed() {
                    break;
                }
                tokio::time::sleep(inner.polling_interval).await;
            }
            debug!("Web3 event stream ended");
        });

        ReceiverStream::new(rx)
    }
}

impl Inner {
    fn block_key(&self) -> String {
        format!("{COMPONENT_NAME}:{}:{}", self.chain_id, self.contract_address)
    }

    async fn initialize_cursor(&self) {
        let store = self.state_store.read().await.clone();
        let block_key = self.block_key();

        let stored = match &store {
            Some(store) => match store.get_last_processed_block(&block_key).await {
                Ok(value) => value,
                Err(e) => {
                    error!("Error reading stored cursor for {block_key}: {e}");
                    None
                }
            },
            None => None,
        };

        let cursor = if let Some(block) = stored {
            info!("Resuming from last processed block {block} for {block_key}");
            block
        } else if let Some(block) = self.start_block {
            info!("Starting from configured block {block} for {block_key}");
            block
        } else {
            match self.provider.get_block_number().await {
                Ok(head) => {
                    info!("Starting from current block {head} for {block_key}");
                    head
                }
                Err(e) => {
                    error!("Unable to get current block for {block_key}: {e}");
                    0
                }
            }
        };

        *self.cursor.write().await = Some(cursor);
    }

    async fn scan(&self, tx: &mpsc::Sender<Event>) -> Result<(), CollectorError> {
        let store = self
            .state_store
            .read()
            .await
            .clone()
            .ok_or_else(|| CollectorError::Config("collector is not started".to_string()))?;

        let current_block = self.provider.get_block_number().await?;
        let last_checked = self
            .cursor
            .read()
            .await
            .unwrap_or(current_block.saturating_sub(1));

        if current_block <= last_checked {
            return Ok(());
        }

        let from_block = last_checked + 1;
        let to_block = current_block.min(from_block + self.max_blocks_per_scan - 1);

        let mut filter = json!({
            "fromBlock": format!("{from_block:#x}"),
            "toBlock": format!("{to_block:#x}"),
            "address": self.contract_address,
        });
        if !self.topic_filter.is_empty() {
            filter["topics"] = json!([self.topic_filter]);
        }

        let logs = self.provider.get_logs(filter).await?;
        let mut timestamps: HashMap<u64, DateTime<Utc>> = HashMap::new();

        for log in logs {
            let block_number = log.block_number.to::<u64>();
            let block_timestamp = match timestamps.get(&block_number) {
                Some(cached) => *cached,
                None => {
                    let timestamp = match self.provider.get_block_header(block_number).await {
                        Ok(Some(header)) => {
                            DateTime::from_timestamp(header.timestamp.to::<u64>() as i64, 0)
                                .unwrap_or_else(Utc::now)
                        }
                        Ok(None) | Err(_) => {
                            warn!("Missing timestamp for block {block_number}, using current time");
                            Utc::now()
                        }
                    };
                    timestamps.insert(block_number, timestamp);
                    timestamp
                }
            };

            let event = Web3LogEvent {
                chain_id: self.chain_id,
                contract_address: log.address,
                topics: log.topics.clone(),
                data: log.data.clone(),
                transaction_hash: log.transaction_hash,
                block_number,
                block_timestamp,
                log_index: log.log_index.map(|idx| idx.to::<u64>()),
            };

            if tx.send(Event::Web3Log(event)).await.is_err() {
                return Ok(());
            }
        }

        *self.cursor.write().await = Some(to_block);
        store.set_last_processed_block(&self.block_key(), to_block).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tempfile::TempDir;

    fn config(server_url: &str, state_dir: &std::path::Path) -> Web3EventCollectorConfig {
        Web3EventCollectorConfig {
            chain_id: 1,
            rpc_endpoints: vec![server_url.to_string()],
            contract_address: "0xdac17f958d2ee523a2206206994597c13d831ec7".parse().unwrap(),
            event_signatures: vec!["Transfer(address,address,uint256)".to_string()],
            polling_interval_secs: 1,
            max_blocks_per_scan: 100,
            start_block: Some(99),
            state_dir: state_dir.to_path_buf(),
            provider: ProviderSettings { rate_limit: 1000.0, ..Default::default() },
        }
    }

    #[tokio::test]
    async fn emits_opaque_log_events_and_advances_cursor() {
        let mut server = Server::new_async().await;
        let _head = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_blockNumber"}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x64"}"#)
            .expect_at_least(1)
            .create_async()
            .await;
        let _logs = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(r#"{"method":"eth_getLogs"}"#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"result":[{
                    "address":"0xdac17f958d2ee523a2206206994597c13d831ec7",
                    "topics":[
                        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                        "0x000000000000000000000000aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                        "0x000000000000000000000000bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
                    ],
                    "data":"0x00000000000000000000000000000000000000000000000000000000000f4240",
                    "blockNumber":"0x64",
                    "transactionHash":"0x00000000000000000000000000000000000000000000000000000000000000aa",
                    "logIndex":"0x0"
                }]}"#,
            )
            .create_async()
            .await;
        let _header = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJsonString(
                r#"{"method":"eth_getBlockByNumber"}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"result":{"number":"0x64","timestamp":"0x65f0a880"}}"#,
            )
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let collector = Web3EventCollector::new(config(&server.url(), dir.path())).unwrap();
        collector.start().await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        collector.run_cycle(&tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Web3Log(log) => {
                assert_eq!(log.chain_id, 1);
                assert_eq!(log.topics.len(), 3);
                assert_eq!(log.block_number, 100);
                assert_eq!(log.log_index, Some(0));
            }
            other => panic!("unexpected event {}", other.kind()),
        }

        assert_eq!(collector.cursor().await, Some(100));
        collector.stop().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_missing_endpoints() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config("http://localhost:1", dir.path());
        cfg.rpc_endpoints.clear();
        assert!(matches!(Web3EventCollector::new(cfg), Err(CollectorError::Config(_))));
    }
}
