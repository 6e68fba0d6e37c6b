//! Multi-hop pattern detection: tokens moving through several addresses in
//! a tight time window, the usual shape of arbitrage.

use std::collections::HashSet;

use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{base_alert_data, default_true, MovementDetector, ALERT_SOURCE};
use crate::{
    strategies::token_movement::{stats::TokenKey, EventContext, MovementLedger},
    types::{Alert, Severity, TokenTransferEvent},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MultiHopConfig {
    pub enabled: bool,
    /// Window around the event, in seconds.
    pub arbitrage_time_window: i64,
    pub min_addresses: usize,
    pub min_tokens: usize,
}

impl Default for MultiHopConfig {
    fn default() -> Self {
        Self { enabled: default_true(), arbitrage_time_window: 60, min_addresses: 3, min_tokens: 2 }
    }
}

pub struct MultiHopDetector {
    config: MultiHopConfig,
}

impl MultiHopDetector {
    pub fn new(config: MultiHopConfig) -> Self {
        Self { config }
    }
}

impl MovementDetector for MultiHopDetector {
    fn name(&self) -> &'static str {
        "multi_hop"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn detect(
        &mut self,
        event: &TokenTransferEvent,
        ledger: &MovementLedger,
        _ctx: &mut EventContext,
    ) -> Vec<Alert> {
        // Arbitrage always goes through contracts.
        if !event.has_contract_interaction {
            return Vec::new();
        }

        let window_start =
            event.block_timestamp - Duration::seconds(self.config.arbitrage_time_window);

        // Recent transfers touching either endpoint. A transfer between
        // the two endpoints sits in both histories and counts twice.
        let related: Vec<_> = ledger
            .transfers_for_address(event.from_address)
            .iter()
            .chain(ledger.transfers_for_address(event.to_address))
            .filter(|transfer| transfer.block_timestamp >= window_start)
            .collect();

        if related.len() < 3 {
            return Vec::new();
        }

        let mut addresses = HashSet::new();
        for transfer in &related {
            addresses.insert(transfer.from_address);
            addresses.insert(transfer.to_address);
        }
        if addresses.len() < self.config.min_addresses {
            return Vec::new();
        }

        // Circular: some address shows up on both sides of the window.
        let has_circular = addresses.iter().any(|address| {
            related.iter().any(|t| t.from_address == *address)
                && related.iter().any(|t| t.to_address == *address)
        });
        if !has_circular {
            return Vec::new();
        }

        let tokens: HashSet<TokenKey> =
            related.iter().map(|t| TokenKey::from(t.token_address)).collect();
        if tokens.len() < self.config.min_tokens {
            return Vec::new();
        }

        info!(
            "Multi-hop transfer pattern detected: {} addresses, {} tokens",
            addresses.len(),
            tokens.len()
        );

        let mut data = base_alert_data(event);
        data.insert("pattern_type".to_string(), Value::from("multi_hop"));
        data.insert(
            "addresses_involved".to_string(),
            Value::from(
                addresses.iter().map(|address| format!("{address:#x}")).collect::<Vec<_>>(),
            ),
        );
        data.insert(
            "tokens_involved".to_string(),
            Value::from(tokens.iter().map(TokenKey::to_string).collect::<Vec<_>>()),
        );
        data.insert("transfer_count".to_string(), Value::from(related.len()));
        data.insert(
            "time_window_seconds".to_string(),
            Value::from(self.config.arbitrage_time_window),
        );

        vec![Alert::new(
            "Potential Arbitrage Pattern Detected",
            format!(
                "Multi-hop transfer pattern involving {} addresses and {} tokens",
                addresses.len(),
                tokens.len()
            ),
            Severity::Medium,
            ALERT_SOURCE,
            data,
        )]
    }
}
