//! Rolling per-token and per-address statistics for a single chain.
//!
//! The ledger is owned by the strategy and is single-writer: the strategy
//! worker records each surviving event before the detectors read it.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use alloy::primitives::Address;
use chrono::{DateTime, Utc};

use crate::types::TokenTransferEvent;

/// Statistics key for a token: the contract address, or the chain's native
/// asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKey {
    Native,
    Token(Address),
}

impl From<Option<Address>> for TokenKey {
    fn from(address: Option<Address>) -> Self {
        match address {
            Some(address) => TokenKey::Token(address),
            None => TokenKey::Native,
        }
    }
}

impl std::fmt::Display for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKey::Native => write!(f, "native"),
            TokenKey::Token(address) => write!(f, "{address:#x}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenStats {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_volume: f64,
    pub transfer_count: u64,
    pub avg_transfer: f64,
    pub max_transfer: f64,
    pub min_transfer: f64,
    /// Rolling mean over the last `window_size` transfers.
    pub mean_value: f64,
    /// Rolling sample standard deviation; zero below two samples.
    pub stdev_value: f64,
    pub token_symbol: String,
    pub is_native: bool,
}

#[derive(Debug, Clone)]
pub struct AddressStats {
    pub first_seen: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub sent_count: u64,
    pub received_count: u64,
    pub total_sent: f64,
    pub total_received: f64,
    pub tokens_transferred: HashSet<TokenKey>,
    pub counterparties: HashSet<Address>,
}

/// Chain-level aggregate, mostly for stats logging.
#[derive(Debug, Clone, Default)]
pub struct ChainActivity {
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub total_volume: f64,
    pub transfer_count: u64,
}

#[derive(Debug)]
pub struct MovementLedger {
    pub token_stats: HashMap<TokenKey, TokenStats>,
    pub address_stats: HashMap<Address, AddressStats>,
    transfers_by_token: HashMap<TokenKey, Vec<Arc<TokenTransferEvent>>>,
    transfers_by_address: HashMap<Address, Vec<Arc<TokenTransferEvent>>>,
    pub address_transfers_by_block: HashMap<Address, BTreeMap<u64, u32>>,
    pub network_transfers_by_block: BTreeMap<u64, u32>,
    pub chain_activity: ChainActivity,
    pub last_checked_block: u64,
    window_size: usize,
    max_history: usize,
}

impl MovementLedger {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            token_stats: HashMap::new(),
            address_stats: HashMap::new(),
            transfers_by_token: HashMap::new(),
            transfers_by_address: HashMap::new(),
            address_transfers_by_block: HashMap::new(),
            network_transfers_by_block: BTreeMap::new(),
            chain_activity: ChainActivity::default(),
            last_checked_block: 0,
            window_size,
            // History is trimmed so memory stays bounded while the rolling
            // window always has enough samples.
            max_history: 1000.max(window_size * 3),
        }
    }

    pub fn token_stats_for(&self, key: TokenKey) -> Option<&TokenStats> {
        self.token_stats.get(&key)
    }

    pub fn transfers_for_address(&self, address: Address) -> &[Arc<TokenTransferEvent>] {
        self.transfers_by_address.get(&address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn transfers_for_token(&self, key: TokenKey) -> &[Arc<TokenTransferEvent>] {
        self.transfers_by_token.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of transfers sent by `address` in the block range
    /// `[start_block, end_block]`.
    pub fn address_transfers_in_range(
        &self,
        address: Address,
        start_block: u64,
        end_block: u64,
    ) -> u64 {
        self.address_transfers_by_block
            .get(&address)
            .map(|blocks| blocks.range(start_block..=end_block).map(|(_, count)| *count as u64).sum())
            .unwrap_or(0)
    }

    /// Fold a transfer into every rolling statistic.
    pub fn record(&mut self, event: Arc<TokenTransferEvent>) {
        let token_key = TokenKey::from(event.token_address);

        self.chain_activity.first_seen.get_or_insert(event.block_timestamp);
        self.chain_activity.last_seen = Some(event.block_timestamp);
        self.chain_activity.transfer_count += 1;
        self.chain_activity.total_volume += event.formatted_value;

        let token_events = self.transfers_by_token.entry(token_key).or_default();
        token_events.push(Arc::clone(&event));
        if token_events.len() > self.max_history {
            let excess = token_events.len() - self.max_history;
            token_events.drain(..excess);
        }

        let recent: Vec<f64> = token_events
            .iter()
            .rev()
            .take(self.window_size)
            .map(|t| t.formatted_value)
            .collect();
        let (mean_value, stdev_value) = rolling_mean_stdev(&recent);

        let stats = self.token_stats.entry(token_key).or_insert_with(|| TokenStats {
            first_seen: event.block_timestamp,
            last_seen: event.block_timestamp,
            total_volume: 0.0,
            transfer_count: 0,
            avg_transfer: event.formatted_value,
            max_transfer: event.formatted_value,
            min_transfer: event.formatted_value,
            mean_value: event.formatted_value,
            stdev_value: 0.0,
            token_symbol: event.token_symbol.clone(),
            is_native: event.is_native,
        });
        stats.last_seen = event.block_timestamp;
        stats.total_volume += event.formatted_value;
        stats.transfer_count += 1;
        stats.max_transfer = stats.max_transfer.max(event.formatted_value);
        stats.min_transfer = stats.min_transfer.min(event.formatted_value);
        stats.avg_transfer = stats.total_volume / stats.transfer_count as f64;
        stats.mean_value = mean_value;
        stats.stdev_value = stdev_value;

        for address in [event.from_address, event.to_address] {
            let address_events = self.transfers_by_address.entry(address).or_default();
            address_events.push(Arc::clone(&event));
            if address_events.len() > self.max_history {
                let excess = address_events.len() - self.max_history;
                address_events.drain(..excess);
            }

            let is_sender = address == event.from_address;
            let counterparty = if is_sender { event.to_address } else { event.from_address };

            let stats = self.address_stats.entry(address).or_insert_with(|| AddressStats {
                first_seen: event.block_timestamp,
                last_active: event.block_timestamp,
                sent_count: 0,
                received_count: 0,
                total_sent: 0.0,
                total_received: 0.0,
                tokens_transferred: HashSet::new(),
                counterparties: HashSet::new(),
            });
            stats.last_active = event.block_timestamp;
            if is_sender {
                stats.sent_count += 1;
                stats.total_sent += event.formatted_value;
            } else {
                stats.received_count += 1;
                stats.total_received += event.formatted_value;
            }
            stats.tokens_transferred.insert(token_key);
            stats.counterparties.insert(counterparty);
        }

        *self.network_transfers_by_block.entry(event.block_number).or_default() += 1;
        *self
            .address_transfers_by_block
            .entry(event.from_address)
            .or_default()
            .entry(event.block_number)
            .or_default() += 1;

        self.last_checked_block = self.last_checked_block.max(event.block_number);
    }
}

fn rolling_mean_stdev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, U256};

    fn transfer(from: u8, to: u8, value: f64, block: u64) -> Arc<TokenTransferEvent> {
        Arc::new(TokenTransferEvent {
            chain_id: 1,
            token_address: None,
            token_name: "ETH".to_string(),
            token_symbol: "ETH".to_string(),
            token_decimals: 18,
            from_address: Address::repeat_byte(from),
            to_address: Address::repeat_byte(to),
            value: U256::from((value * 1e18) as u128),
            formatted_value: value,
            transaction_hash: B256::repeat_byte(block as u8),
            block_number: block,
            block_timestamp: Utc::now(),
            log_index: None,
            is_native: true,
            has_contract_interaction: false,
        })
    }

    #[test]
    fn token_stats_accumulate() {
        let mut ledger = MovementLedger::new(100);
        ledger.record(transfer(1, 2, 10.0, 100));
        ledger.record(transfer(1, 2, 30.0, 101));

        let stats = ledger.token_stats_for(TokenKey::Native).unwrap();
        assert_eq!(stats.transfer_count, 2);
        assert_eq!(stats.total_volume, 40.0);
        assert_eq!(stats.avg_transfer, 20.0);
        assert_eq!(stats.max_transfer, 30.0);
        assert_eq!(stats.min_transfer, 10.0);
        assert_eq!(stats.mean_value, 20.0);
        // Sample stdev of {10, 30}.
        assert!((stats.stdev_value - 14.142135623730951).abs() < 1e-9);
    }

    #[test]
    fn stdev_is_zero_below_two_samples() {
        let mut ledger = MovementLedger::new(100);
        ledger.record(transfer(1, 2, 5.0, 100));
        let stats = ledger.token_stats_for(TokenKey::Native).unwrap();
        assert_eq!(stats.stdev_value, 0.0);
    }

    #[test]
    fn address_stats_track_both_directions() {
        let mut ledger = MovementLedger::new(100);
        ledger.record(transfer(1, 2, 10.0, 100));
        ledger.record(transfer(2, 1, 4.0, 101));

        let a = ledger.address_stats.get(&Address::repeat_byte(1)).unwrap();
        assert_eq!(a.sent_count, 1);
        assert_eq!(a.received_count, 1);
        assert_eq!(a.total_sent, 10.0);
        assert_eq!(a.total_received, 4.0);
        assert_eq!(a.counterparties.len(), 1);
        assert!(a.tokens_transferred.contains(&TokenKey::Native));
    }

    #[test]
    fn history_trims_to_bounded_window() {
        let mut ledger = MovementLedger::new(10);
        assert_eq!(ledger.max_history, 1000);

        for block in 0..1100u64 {
            ledger.record(transfer(1, 2, 1.0, block));
        }
        assert_eq!(ledger.transfers_for_token(TokenKey::Native).len(), 1000);
        assert_eq!(ledger.transfers_for_address(Address::repeat_byte(1)).len(), 1000);
        // Totals keep counting past the trim.
        assert_eq!(ledger.token_stats_for(TokenKey::Native).unwrap().transfer_count, 1100);
    }

    #[test]
    fn per_block_sender_counts_are_range_queryable() {
        let mut ledger = MovementLedger::new(100);
        for block in [100, 100, 101, 105] {
            ledger.record(transfer(7, 8, 1.0, block));
        }

        let sender = Address::repeat_byte(7);
        assert_eq!(ledger.address_transfers_in_range(sender, 100, 101), 3);
        assert_eq!(ledger.address_transfers_in_range(sender, 100, 105), 4);
        assert_eq!(ledger.address_transfers_in_range(sender, 102, 104), 0);
        assert_eq!(ledger.last_checked_block, 105);
    }
}
