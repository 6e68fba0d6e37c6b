//! Wash trading detection: the same pair of addresses passing value back
//! and forth inside a time window.

use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{base_alert_data, default_true, MovementDetector, ALERT_SOURCE};
use crate::{
    strategies::token_movement::{EventContext, MovementLedger},
    types::{Alert, Severity, TokenTransferEvent},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WashTradingConfig {
    pub enabled: bool,
    pub back_and_forth_threshold: usize,
    pub window_hours: i64,
}

impl Default for WashTradingConfig {
    fn default() -> Self {
        Self { enabled: default_true(), back_and_forth_threshold: 3, window_hours: 24 }
    }
}

pub struct WashTradingDetector {
    config: WashTradingConfig,
}

impl WashTradingDetector {
    pub fn new(config: WashTradingConfig) -> Self {
        Self { config }
    }
}

impl MovementDetector for WashTradingDetector {
    fn name(&self) -> &'static str {
        "wash_trading"
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
        let window_start = event.block_timestamp - Duration::hours(self.config.window_hours);

        // Transfers in the pair's direction A->B live in A's history, the
        // B->A direction in B's history.
        let forward = ledger
            .transfers_for_address(event.from_address)
            .iter()
            .filter(|t| t.block_timestamp >= window_start && t.to_address == event.to_address)
            .count();
        let backward = ledger
            .transfers_for_address(event.to_address)
            .iter()
            .filter(|t| t.block_timestamp >= window_start && t.to_address == event.from_address)
            .count();

        let back_and_forth = forward + backward;
        if back_and_forth < self.config.back_and_forth_threshold {
            return Vec::new();
        }

        info!(
            "Potential wash trading detected: {back_and_forth} transfers back and forth between {:#x} and {:#x}",
            event.from_address, event.to_address
        );

        let mut data = base_alert_data(event);
        data.insert("back_and_forth_count".to_string(), Value::from(back_and_forth));
        data.insert("window_hours".to_string(), Value::from(self.config.window_hours));

        vec![Alert::new(
            "Potential Wash Trading Detected",
            format!(
                "Detected {back_and_forth} transfers back and forth between {:#x} and {:#x} within {} hours",
                event.from_address, event.to_address, self.config.window_hours
            ),
            Severity::Medium,
            ALERT_SOURCE,
            data,
        )]
    }
}
