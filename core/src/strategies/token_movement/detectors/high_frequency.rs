//! High-frequency sender detection over a block window.

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{base_alert_data, default_true, MovementDetector, ALERT_SOURCE};
use crate::{
    chains,
    strategies::token_movement::{EventContext, MovementLedger},
    types::{Alert, Severity, TokenTransferEvent},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HighFrequencyConfig {
    pub enabled: bool,
    /// Transfers per window before an alert fires.
    pub threshold: u64,
    pub window_minutes: u64,
    /// Rolling-statistics window size shared with the ledger.
    pub window_size: usize,
}

impl Default for HighFrequencyConfig {
    fn default() -> Self {
        Self { enabled: default_true(), threshold: 20, window_minutes: 30, window_size: 100 }
    }
}

pub struct HighFrequencyDetector {
    config: HighFrequencyConfig,
    /// Last block already analyzed, so one busy block alerts once.
    last_analyzed_block: u64,
}

impl HighFrequencyDetector {
    pub fn new(config: HighFrequencyConfig) -> Self {
        Self { config, last_analyzed_block: 0 }
    }
}

impl MovementDetector for HighFrequencyDetector {
    fn name(&self) -> &'static str {
        "high_frequency"
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
        // Only analyze each block once per chain.
        if event.block_number <= self.last_analyzed_block {
            return Vec::new();
        }
        self.last_analyzed_block = event.block_number;

        let window_seconds = self.config.window_minutes * 60;
        let window_blocks = chains::blocks_from_secs(event.chain_id, window_seconds as f64);
        let start_block = event.block_number.saturating_sub(window_blocks);

        let transfer_count = ledger.address_transfers_in_range(
            event.from_address,
            start_block,
            event.block_number,
        );

        if transfer_count < self.config.threshold {
            return Vec::new();
        }

        let window_hours = window_seconds as f64 / 3600.0;
        info!(
            "High-frequency trading detected for address {:#x}: {transfer_count} transfers in {window_blocks} blocks",
            event.from_address
        );

        let mut data = base_alert_data(event);
        data.insert("address".to_string(), Value::from(format!("{:#x}", event.from_address)));
        data.insert("transfer_count".to_string(), Value::from(transfer_count));
        data.insert("window_blocks".to_string(), Value::from(window_blocks));
        data.insert("window_hours".to_string(), Value::from(window_hours));
        data.insert("threshold".to_string(), Value::from(self.config.threshold));

        vec![Alert::new(
            "High-Frequency Trading Detected",
            format!(
                "Address {:#x} has made {transfer_count} transfers in {window_blocks} blocks (~{window_hours:.1} hours)",
                event.from_address
            ),
            Severity::Medium,
            ALERT_SOURCE,
            data,
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::token_movement::test_support::transfer_event;
    use std::sync::Arc;

    fn detector(threshold: u64) -> HighFrequencyDetector {
        HighFrequencyDetector::new(HighFrequencyConfig {
            threshold,
            ..HighFrequencyConfig::default()
        })
    }

    #[test]
    fn fires_when_sender_crosses_threshold() {
        let mut ledger = MovementLedger::new(100);
        let mut ctx = EventContext::default();
        let mut detector = detector(3);

        for block in [100, 101, 102] {
            ledger.record(Arc::new(transfer_event(1, 2, 1.0, block)));
        }

        let event = transfer_event(1, 2, 1.0, 103);
        ledger.record(Arc::new(event.clone()));

        let alerts = detector.detect(&event, &ledger, &mut ctx);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "High-Frequency Trading Detected");
        assert_eq!(alerts[0].data["transfer_count"], Value::from(4u64));
    }

    #[test]
    fn deduplicates_by_block() {
        let mut ledger = MovementLedger::new(100);
        let mut ctx = EventContext::default();
        let mut detector = detector(1);

        let event = transfer_event(1, 2, 1.0, 100);
        ledger.record(Arc::new(event.clone()));
        assert_eq!(detector.detect(&event, &ledger, &mut ctx).len(), 1);

        // Same block: skipped outright.
        assert!(detector.detect(&event, &ledger, &mut ctx).is_empty());

        // Strictly newer block fires again.
        let next = transfer_event(1, 2, 1.0, 101);
        ledger.record(Arc::new(next.clone()));
        assert_eq!(detector.detect(&next, &ledger, &mut ctx).len(), 1);
    }

    #[test]
    fn quiet_senders_stay_silent() {
        let mut ledger = MovementLedger::new(100);
        let mut ctx = EventContext::default();
        let mut detector = detector(20);

        let event = transfer_event(1, 2, 1.0, 100);
        ledger.record(Arc::new(event.clone()));
        assert!(detector.detect(&event, &ledger, &mut ctx).is_empty());
    }
}
