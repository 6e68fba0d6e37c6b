//! Token transfer collector: scans one or more EVM networks for ERC20
//! `Transfer` logs and native value transfers, and yields one
//! [`TokenTransferEvent`] per transfer. Collection only - no filtering or
//! analysis happens here.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use alloy::primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::{Collector, CollectorError};
use crate::{
    chains,
    erc20::{format_units, Erc20MetadataReader},
    provider::{MultiNodeProvider, ProviderSettings, RpcLog, RpcTransaction},
    storage::StateStore,
    types::{Event, TokenTransferEvent},
};

pub const COMPONENT_NAME: &str = "token_transfer";

static TRANSFER_EVENT_TOPIC: Lazy<B256> =
    Lazy::new(|| keccak256(b"Transfer(address,address,uint256)"));

/// `transfer(address,uint256)`
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// `transferFrom(address,address,uint256)`
const TRANSFER_FROM_SELECTOR: [u8; 4] = [0x23, 0xb8, 0x72, 0xdd];

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_endpoints: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenTransferCollectorConfig {
    /// Networks to monitor, keyed by name.
    pub networks: HashMap<String, NetworkConfig>,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    #[serde(default = "default_max_blocks_per_scan")]
    pub max_blocks_per_scan: u64,
    /// Optional starting block per network, used when no cursor is stored.
    #[serde(default)]
    pub start_block: HashMap<String, u64>,
    /// ERC20 token allowlist per network. ERC20 scanning is skipped for
    /// networks without one.
    #[serde(default)]
    pub token_addresses: HashMap<String, Vec<Address>>,
    #[serde(default = "default_true")]
    pub include_native_transfers: bool,
    #[serde(default = "default_true")]
    pub include_erc20_transfers: bool,
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
fn default_true() -> bool {
    true
}
fn default_state_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("data/state")
}

struct NetworkRuntime {
    name: String,
    chain_id: u64,
    provider: Arc<MultiNodeProvider>,
    metadata: Erc20MetadataReader,
    allowlist: Vec<Address>,
    /// `eth_getCode` results, cached per address.
    code_cache: RwLock<HashMap<Address, bool>>,
}

struct Inner {
    polling_interval: Duration,
    max_blocks_per_scan: u64,
    start_blocks: HashMap<String, u64>,
    include_native_transfers: bool,
    include_erc20_transfers: bool,
    state_dir: std::path::PathBuf,
    networks: Vec<NetworkRuntime>,
    state_store: RwLock<Option<StateStore>>,
    cursors: RwLock<HashMap<String, u64>>,
    running: AtomicBool,
    started: AtomicBool,
}

pub struct TokenTransferCollector {
    inner: Arc<Inner>,
}

impl TokenTransferCollector {
    pub fn new(config: TokenTransferCollectorConfig) -> Result<Self, CollectorError> {
        if config.networks.is_empty() {
            return Err(CollectorError::Config(
                "at least one blockchain network must be configured".to_string(),
            ));
        }

        let mut networks = Vec::with_capacity(config.networks.len());
        for (name, network) in &config.networks {
            if network.rpc_endpoints.is_empty() {
                return Err(CollectorError::Config(format!(
                    "network {name} is missing rpc_endpoints"
                )));
            }
            let provider = MultiNodeProvider::new(&network.rpc_endpoints, &config.provider)?;
            networks.push(NetworkRuntime {
                name: name.clone(),
                chain_id: network.chain_id,
                provider: Arc::new(provider),
                metadata: Erc20MetadataReader::new(),
                allowlist: config.token_addresses.get(name).cloned().unwrap_or_default(),
                code_cache: RwLock::new(HashMap::new()),
            });
        }
        networks.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            inner: Arc::new(Inner {
                polling_interval: Duration::from_secs(config.polling_interval_secs),
                max_blocks_per_scan: config.max_blocks_per_scan.max(1),
                start_blocks: config.start_block,
                include_native_transfers: config.include_native_transfers,
                include_erc20_transfers: config.include_erc20_transfers,
                state_dir: config.state_dir,
                networks,
                state_store: RwLock::new(None),
                cursors: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
                started: AtomicBool::new(false),
            }),
        })
    }

    #[cfg(test)]
    pub(crate) async fn cursor_for(&self, network: &str) -> Option<u64> {
        self.inner.cursors.read().await.get(network).copied()
    }

    #[cfg(test)]
    pub(crate) async fn run_cycle(&self, tx: &mpsc::Sender<Event>) {
        self.inner.poll_all_networks(tx).await;
    }
}

#[async_trait]
impl Collector for TokenTransferCollector {
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

        self.inner.initialize_cursors().await;

        for network in &self.inner.networks {
            if !network.provider.is_connected().await {
                warn!("Unable to connect to network {}", network.name);
            }
        }

        self.inner.preload_tokens().await;

        info!("Collector {COMPONENT_NAME} started");
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
                inner.poll_all_networks(&tx).await;

                if tx.is_closed() {
                    break;
                }
                tokio::time::sleep(inner.polling_interval).await;
            }
            debug!("Token transfer event stream ended");
        });

        ReceiverStream::new(rx)
    }
}

impl Inner {
    /// Resume cursor preference order: stored cursor, configured start
    /// block, current head.
    async fn initialize_cursors(&self) {
        let store = self.state_store.read().await.clone();
        let mut cursors = self.cursors.write().await;

        for network in &self.networks {
            let block_key = format!("{COMPONENT_NAME}:{}", network.name);

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
            } else if let Some(block) = self.start_blocks.get(&network.name) {
                info!("Starting from configured block {block} for {block_key}");
                *block
            } else {
                match network.provider.get_block_number().await {
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

            cursors.insert(network.name.clone(), cursor);
        }
    }

    /// Warm the metadata cache for allowlisted tokens.
    async fn preload_tokens(&self) {
        for network in &self.networks {
            for token in &network.allowlist {
                let metadata = network.metadata.metadata(&network.provider, *token).await;
                info!(
                    "Loaded token {} ({token}) on network {}",
                    metadata.symbol, network.name
                );
            }
        }
    }

    async fn poll_all_networks(&self, tx: &mpsc::Sender<Event>) {
        for network in &self.networks {
            if !self.running.load(Ordering::SeqCst) || tx.is_closed() {
                return;
            }
            if let Err(e) = self.scan_network(network, tx).await {
                error!(
                    "Error collecting token transfer events for network {}: {e}",
                    network.name
                );
            }
        }
    }

    async fn scan_network(
        &self,
        network: &NetworkRuntime,
        tx: &mpsc::Sender<Event>,
    ) -> Result<(), CollectorError> {
        let store = self
            .state_store
            .read()
            .await
            .clone()
            .ok_or_else(|| CollectorError::Config("collector is not started".to_string()))?;

        let current_block = network.provider.get_block_number().await?;
        let last_checked = {
            let cursors = self.cursors.read().await;
            cursors.get(&network.name).copied().unwrap_or(current_block.saturating_sub(1))
        };

        if current_block <= last_checked {
            return Ok(());
        }

        let from_block = last_checked + 1;
        let to_block = current_block.min(from_block + self.max_blocks_per_scan - 1);
        let block_key = format!("{COMPONENT_NAME}:{}", network.name);

        info!(
            "Scanning network {} from block {from_block} to {to_block} for {COMPONENT_NAME}",
            network.name
        );

        let mut timestamps: HashMap<u64, DateTime<Utc>> = HashMap::new();
        let mut erc20_events = 0u64;
        let mut native_events = 0u64;

        if self.include_erc20_transfers && !network.allowlist.is_empty() {
            erc20_events =
                self.scan_erc20_transfers(network, from_block, to_block, &mut timestamps, tx).await;
        }
        if self.include_native_transfers {
            native_events =
                self.scan_native_transfers(network, from_block, to_block, &mut timestamps, tx).await;
        }

        // The cursor advances only after the whole range has been attempted.
        self.cursors.write().await.insert(network.name.clone(), to_block);
        store.set_last_processed_block(&block_key, to_block).await?;

        let stats = json!({
            "last_processed_time": Utc::now().to_rfc3339(),
            "last_processed_block": to_block,
            "events_collected": erc20_events + native_events,
            "erc20_events": erc20_events,
            "native_events": native_events,
        });
        if let Err(e) = store.store_collector_stats(&block_key, &stats).await {
            error!("Error storing stats for {block_key}: {e}");
        }

        if to_block % 1000 == 0 {
            store.create_checkpoint(&block_key, to_block, &Utc::now().to_rfc3339()).await?;
        }

        Ok(())
    }

    async fn scan_erc20_transfers(
        &self,
        network: &NetworkRuntime,
        from_block: u64,
        to_block: u64,
        timestamps: &mut HashMap<u64, DateTime<Utc>>,
        tx: &mpsc::Sender<Event>,
    ) -> u64 {
        let filter = json!({
            "fromBlock": format!("{from_block:#x}"),
            "toBlock": format!("{to_block:#x}"),
            "address": network.allowlist,
            "topics": [*TRANSFER_EVENT_TOPIC],
        });

        let logs = match network.provider.get_logs(filter).await {
            Ok(logs) => logs,
            Err(e) => {
                error!("Error getting transfer logs for network {}: {e}", network.name);
                return 0;
            }
        };

        let mut emitted = 0u64;
        for log in logs {
            match self.build_erc20_event(network, &log, timestamps).await {
                Ok(event) => {
                    if tx.send(Event::TokenTransfer(event)).await.is_err() {
                        return emitted;
                    }
                    emitted += 1;
                }
                Err(e) => error!("Error processing ERC20 transfer event: {e}"),
            }
        }
        emitted
    }

    async fn build_erc20_event(
        &self,
        network: &NetworkRuntime,
        log: &RpcLog,
        timestamps: &mut HashMap<u64, DateTime<Utc>>,
    ) -> Result<TokenTransferEvent, CollectorError> {
        if log.topics.len() < 3 {
            return Err(CollectorError::Decode(format!(
                "transfer log {} has {} topics, expected 3",
                log.transaction_hash,
                log.topics.len()
            )));
        }

        let from_address = address_from_topic(&log.topics[1]);
        let to_address = address_from_topic(&log.topics[2]);

        if log.data.len() != 32 {
            return Err(CollectorError::Decode(format!(
                "transfer log {} has {} data bytes, expected 32",
                log.transaction_hash,
                log.data.len()
            )));
        }
        let value = U256::from_be_slice(&log.data);

        let metadata = network.metadata.metadata(&network.provider, log.address).await;
        let formatted_value = format_units(value, metadata.decimals);

        let block_number = log.block_number.to::<u64>();
        let block_timestamp = self.block_timestamp(network, block_number, timestamps).await;

        let has_contract_interaction = self
            .detect_contract_interaction(network, log.transaction_hash, to_address)
            .await;

        Ok(TokenTransferEvent {
            chain_id: network.chain_id,
            token_address: Some(log.address),
            token_name: metadata.name.clone(),
            token_symbol: metadata.symbol.clone(),
            token_decimals: metadata.decimals,
            from_address,
            to_address,
            value,
            formatted_value,
            transaction_hash: log.transaction_hash,
            block_number,
            block_timestamp,
            log_index: log.log_index.map(|idx| idx.to::<u64>()),
            is_native: false,
            has_contract_interaction,
        })
    }

    /// Best-effort classification of whether an ERC20 transfer is part of a
    /// larger contract call. Failures are logged, never fatal.
    async fn detect_contract_interaction(
        &self,
        network: &NetworkRuntime,
        tx_hash: B256,
        recipient: Address,
    ) -> bool {
        let transaction = match network.provider.get_transaction_by_hash(tx_hash).await {
            Ok(Some(transaction)) => transaction,
            Ok(None) => return false,
            Err(e) => {
                debug!("Error checking transaction data for contract interaction: {e}");
                return false;
            }
        };

        let input = transaction.input.as_ref();
        if input.is_empty() {
            return false;
        }

        let is_plain_transfer =
            input.starts_with(&TRANSFER_SELECTOR) || input.starts_with(&TRANSFER_FROM_SELECTOR);
        if !is_plain_transfer {
            return true;
        }

        // A plain transfer call sent to a contract recipient still counts.
        self.is_contract_address(network, recipient).await
    }

    async fn is_contract_address(&self, network: &NetworkRuntime, address: Address) -> bool {
        if let Some(known) = network.code_cache.read().await.get(&address) {
            return *known;
        }

        let is_contract = match network.provider.get_code(address).await {
            Ok(code) => !code.is_empty(),
            Err(e) => {
                debug!("Error fetching code for {address}: {e}");
                return false;
            }
        };
        network.code_cache.write().await.insert(address, is_contract);
        is_contract
    }

    async fn scan_native_transfers(
        &self,
        network: &NetworkRuntime,
        from_block: u64,
        to_block: u64,
        timestamps: &mut HashMap<u64, DateTime<Utc>>,
        tx: &mpsc::Sender<Event>,
    ) -> u64 {
        let native_symbol = chains::native_symbol(network.chain_id);
        let native_decimals = chains::native_decimals(network.chain_id);
        let mut emitted = 0u64;

        for block_number in from_block..=to_block {
            let block = match network.provider.get_block_with_transactions(block_number).await {
                Ok(Some(block)) => block,
                Ok(None) => continue,
                Err(e) => {
                    error!(
                        "Error scanning block {block_number} on network {} for native transfers: {e}",
                        network.name
                    );
                    continue;
                }
            };

            let block_timestamp = timestamp_from_secs(block.timestamp.to::<u64>(), block_number);
            timestamps.insert(block_number, block_timestamp);

            for transaction in &block.transactions {
                let Some(event) = native_transfer_event(
                    network.chain_id,
                    native_symbol,
                    native_decimals,
                    transaction,
                    block_number,
                    block_timestamp,
                ) else {
                    continue;
                };

                if tx.send(Event::TokenTransfer(event)).await.is_err() {
                    return emitted;
                }
                emitted += 1;
            }
        }
        emitted
    }

    async fn block_timestamp(
        &self,
        network: &NetworkRuntime,
        block_number: u64,
        timestamps: &mut HashMap<u64, DateTime<Utc>>,
    ) -> DateTime<Utc> {
        if let Some(cached) = timestamps.get(&block_number) {
            return *cached;
        }

        let timestamp = match network.provider.get_block_header(block_number).await {
            Ok(Some(header)) => timestamp_from_secs(header.timestamp.to::<u64>(), block_number),
            Ok(None) | Err(_) => {
                warn!("Missing timestamp for block {block_number}, using current time");
                Utc::now()
            }
        };
        timestamps.insert(block_number, timestamp);
        timestamp
    }
}

/// An indexed address topic stores the address in the last 20 of 32 bytes.
pub(crate) fn address_from_topic(topic: &B256) -> Address {
    Address::from_slice(&topic[12..])
}

fn timestamp_from_secs(secs: u64, block_number: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs as i64, 0).unwrap_or_else(|| {
        warn!("Missing timestamp for block {block_number}, using current time");
        Utc::now()
    })
}

/// Native transfers are transactions with a recipient and nonzero value.
fn native_transfer_event(
    chain_id: u64,
    native_symbol: &str,
    native_decimals: u8,
    transaction: &RpcTransaction,
    block_number: u64,
    block_timestamp: DateTime<Utc>,
) -> Option<TokenTransferEvent> {
    let to_address = transaction.to?;
    if transaction.value.is_zero() {
        return None;
    }

    Some(TokenTransferEvent {
        chain_id,
        token_address: None,
        token_name: native_symbol.to_string(),
        token_symbol: native_symbol.to_string(),
        token_decimals: native_decimals,
        from_address: transaction.from,
        to_address,
        value: transaction.value,
        formatted_value: format_units(transaction.value, native_decimals),
        transaction_hash: transaction.hash,
        block_number,
        block_timestamp,
        log_index: None,
        is_native: true,
        has_contract_interaction: !transaction.input.is_empty(),
    })
}
