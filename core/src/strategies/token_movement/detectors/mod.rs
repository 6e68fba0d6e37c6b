//! Detector plugins. Each detector looks for one movement pattern and owns
//! its configuration plus whatever dedup state it needs.

pub mod continuous_flow;
pub mod high_frequency;
pub mod multi_hop;
pub mod periodic_transfer;
pub mod significant_transfer;
pub mod wash_trading;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{EventContext, MovementLedger};
use crate::{
    chains,
    types::{Alert, TokenTransferEvent},
};

pub use continuous_flow::{ContinuousFlowConfig, ContinuousFlowDetector};
pub use high_frequency::{HighFrequencyConfig, HighFrequencyDetector};
pub use multi_hop::{MultiHopConfig, MultiHopDetector};
pub use periodic_transfer::{PeriodicTransferConfig, PeriodicTransferDetector};
pub use significant_transfer::{SignificantTransferConfig, SignificantTransferDetector};
pub use wash_trading::{WashTradingConfig, WashTradingDetector};

pub const ALERT_SOURCE: &str = "token_movement_strategy";

pub trait MovementDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn enabled(&self) -> bool;

    /// Analyze one prepared event against the ledger. Detectors may write
    /// classification verdicts into the shared context.
    fn detect(
        &mut self,
        event: &TokenTransferEvent,
        ledger: &MovementLedger,
        ctx: &mut EventContext,
    ) -> Vec<Alert>;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectorsConfig {
    pub significant_transfer: SignificantTransferConfig,
    pub high_frequency: HighFrequencyConfig,
    pub continuous_flow: ContinuousFlowConfig,
    pub periodic_transfer: PeriodicTransferConfig,
    pub multi_hop: MultiHopConfig,
    pub wash_trading: WashTradingConfig,
}

/// Event fields every alert carries.
pub(crate) fn base_alert_data(event: &TokenTransferEvent) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("chain_id".to_string(), Value::from(event.chain_id));
    data.insert("chain_name".to_string(), Value::from(chains::chain_name(event.chain_id)));
    data.insert("token_symbol".to_string(), Value::from(event.token_symbol.clone()));
    data.insert(
        "token_address".to_string(),
        match event.token_address {
            Some(address) => Value::from(format!("{address:#x}")),
            None => Value::Null,
        },
    );
    data.insert("from_address".to_string(), Value::from(format!("{:#x}", event.from_address)));
    data.insert("to_address".to_string(), Value::from(format!("{:#x}", event.to_address)));
    data.insert("value".to_string(), Value::from(event.value.to_string()));
    data.insert("formatted_value".to_string(), Value::from(event.formatted_value));
    data.insert(
        "transaction_hash".to_string(),
        Value::from(format!("{:#x}", event.transaction_hash)),
    );
    data.insert("block_number".to_string(), Value::from(event.block_number));
    data
}

pub(crate) fn default_true() -> bool {
    true
}
