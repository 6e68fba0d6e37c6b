use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All events flowing through the pipeline.
///
/// Collectors produce these, the event queue persists them and strategies
/// pattern-match on the variant they care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    TokenTransfer(TokenTransferEvent),
    Web3Log(Web3LogEvent),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TokenTransfer(_) => "token_transfer",
            Event::Web3Log(_) => "web3_log",
        }
    }
}

/// A single ERC20 or native token transfer.
///
/// `token_address` is `None` for native transfers and `formatted_value` is
/// always `value / 10^token_decimals`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransferEvent {
    pub chain_id: u64,
    pub token_address: Option<Address>,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimals: u8,
    pub from_address: Address,
    pub to_address: Address,
    pub value: U256,
    pub formatted_value: f64,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    pub log_index: Option<u64>,
    pub is_native: bool,
    pub has_contract_interaction: bool,
}

/// An opaque contract log picked up by the generic web3 event collector.
///
/// Carries the raw topics and data so downstream strategies can decode it
/// with whatever ABI they know about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Web3LogEvent {
    pub chain_id: u64,
    pub contract_address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    pub log_index: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transfer() -> TokenTransferEvent {
        TokenTransferEvent {
            chain_id: 1,
            token_address: None,
            token_name: "ETH".to_string(),
            token_symbol: "ETH".to_string(),
            token_decimals: 18,
            from_address: Address::ZERO,
            to_address: Address::repeat_byte(0x11),
            value: U256::from(2_000_000_000_000_000_000u128),
            formatted_value: 2.0,
            transaction_hash: B256::repeat_byte(0xab),
            block_number: 100,
            block_timestamp: Utc::now(),
            log_index: None,
            is_native: true,
            has_contract_interaction: false,
        }
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = Event::TokenTransfer(sample_transfer());
        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: Event = serde_json::from_str(&encoded).unwrap();

        match decoded {
            Event::TokenTransfer(transfer) => {
                assert_eq!(transfer.chain_id, 1);
                assert_eq!(transfer.formatted_value, 2.0);
                assert!(transfer.is_native);
                assert_eq!(transfer.token_address, None);
            }
            other => panic!("expected token transfer, got {}", other.kind()),
        }
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let event = Event::TokenTransfer(sample_transfer());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], event.kind());
    }
}
