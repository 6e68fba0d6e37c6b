//! Sustained one-directional flow detection for a single address.

use std::collections::BTreeSet;

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
pub struct ContinuousFlowConfig {
    pub enabled: bool,
    pub min_transactions: usize,
    /// |flow ratio| needed before a pattern counts, in [0, 1].
    pub flow_ratio_threshold: f64,
    /// Minimum windowed volume worth reporting.
    pub significant_threshold: f64,
    pub window_hours: i64,
}

impl Default for ContinuousFlowConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            min_transactions: 5,
            flow_ratio_threshold: 0.7,
            significant_threshold: 100.0,
            window_hours: 24,
        }
    }
}

pub struct ContinuousFlowDetector {
    config: ContinuousFlowConfig,
}

impl ContinuousFlowDetector {
    pub fn new(config: ContinuousFlowConfig) -> Self {
        Self { config }
    }
}

impl MovementDetector for ContinuousFlowDetector {
    fn name(&self) -> &'static str {
        "continuous_flow"
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
        let address = event.from_address;
        let transfers = ledger.transfers_for_address(address);
        if transfers.len() < self.config.min_transactions {
            return Vec::new();
        }

        let window_start = event.block_timestamp - Duration::hours(self.config.window_hours);

        let mut total_inflow = 0.0;
        let mut total_outflow = 0.0;
        let mut inflow_count = 0usize;
        let mut outflow_count = 0usize;
        let mut token_symbols = BTreeSet::new();

        for transfer in transfers {
            if transfer.block_timestamp < window_start {
                continue;
            }
            if transfer.to_address == address {
                total_inflow += transfer.formatted_value;
                inflow_count += 1;
            } else if transfer.from_address == address {
                total_outflow += transfer.formatted_value;
                outflow_count += 1;
            }
            if !transfer.token_symbol.is_empty() {
                token_symbols.insert(transfer.token_symbol.clone());
            }
        }

        let net_flow = total_inflow - total_outflow;
        let total_volume = total_inflow + total_outflow;
        if total_volume < self.config.significant_threshold {
            return Vec::new();
        }
        if inflow_count + outflow_count < self.config.min_transactions {
            return Vec::new();
        }

        let flow_ratio = if total_volume > 0.0 { net_flow / total_volume } else { 0.0 };
        if flow_ratio.abs() < self.config.flow_ratio_threshold {
            return Vec::new();
        }

        let is_inflow = flow_ratio > 0.0;
        let flow_type = if is_inflow { "Inflow" } else { "Outflow" };
        let transaction_count = inflow_count + outflow_count;
        let pattern_type =
            if transaction_count >= 10 { "long_term_biased" } else { "short_term_consecutive" };

        let severity = if net_flow.abs() > self.config.significant_threshold * 10.0 {
            Severity::High
        } else if net_flow.abs() > self.config.significant_threshold {
            Severity::Medium
        } else {
            Severity::Info
        };

        let tokens = if token_symbols.is_empty() {
            "tokens".to_string()
        } else {
            token_symbols.iter().cloned().collect::<Vec<_>>().join(", ")
        };

        let (title, description) = if pattern_type == "short_term_consecutive" {
            let recent_count = if is_inflow { inflow_count } else { outflow_count };
            let recent_amount = if is_inflow { total_inflow } else { total_outflow };
            (
                format!("Short-term Consecutive {flow_type} Pattern"),
                format!(
                    "Address {address:#x} shows {recent_count} consecutive {} transactions of {tokens} totaling {recent_amount:.2}",
                    flow_type.to_lowercase()
                ),
            )
        } else {
            (
                format!("Consistent {flow_type} Pattern Detected"),
                format!(
                    "Address {address:#x} shows consistent {} pattern ({:.1}% of activity) of {tokens} across {transaction_count} transactions, net {}: {:.2}",
                    flow_type.to_lowercase(),
                    flow_ratio.abs() * 100.0,
                    flow_type.to_lowercase(),
                    net_flow.abs()
                ),
            )
        };

        info!(
            "Continuous {} detected for address {address:#x}: pattern={pattern_type}, net_flow={}",
            flow_type.to_lowercase(),
            net_flow.abs()
        );

        let mut data = base_alert_data(event);
        data.insert("address".to_string(), Value::from(format!("{address:#x}")));
        data.insert("flow_type".to_string(), Value::from(flow_type));
        data.insert("pattern_type".to_string(), Value::from(pattern_type));
        data.insert("flow_ratio".to_string(), Value::from(flow_ratio));
        data.insert("total_inflow".to_string(), Value::from(total_inflow));
        data.insert("total_outflow".to_string(), Value::from(total_outflow));
        data.insert("net_flow".to_string(), Value::from(net_flow));
        data.insert("inflow_count".to_string(), Value::from(inflow_count));
        data.insert("outflow_count".to_string(), Value::from(outflow_count));
        data.insert("window_hours".to_string(), Value::from(self.config.window_hours));
        data.insert(
            "token_symbols".to_string(),
            Value::from(token_symbols.into_iter().collect::<Vec<_>>()),
        );

        vec![Alert::new(title, description, severity, ALERT_SOURCE, data)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::token_movement::test_support::transfer_event;
    use std::sync::Arc;

    fn detector() -> ContinuousFlowDetector {
        ContinuousFlowDetector::new(ContinuousFlowConfig::default())
    }

    #[test]
    fn detects_one_directional_outflow() {
        let mut ledger = MovementLedger::new(100);
        let mut ctx = EventContext::default();
        let mut detector = detector();

        // Five outflows of 50 from address 1; nothing coming back.
        for block in 100..105u64 {
            ledger.record(Arc::new(transfer_event(1, 2, 50.0, block)));
        }
        let event = transfer_event(1, 2, 50.0, 104);

        let alerts = detector.detect(&event, &ledger, &mut ctx);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Short-term Consecutive Outflow Pattern");
        assert_eq!(alerts[0].data["pattern_type"], Value::from("short_term_consecutive"));
        // Net flow of 250 is above 10x the 100.0 threshold? No - 250 < 1000,
        // above 100, so medium.
        assert_eq!(alerts[0].severity, Severity::Medium);
    }

    #[test]
    fn balanced_flow_stays_silent() {
        let mut ledger = MovementLedger::new(100);
        let mut ctx = EventContext::default();
        let mut detector = detector();

        for block in 100..104u64 {
            ledger.record(Arc::new(transfer_event(1, 2, 50.0, block)));
            ledger.record(Arc::new(transfer_event(2, 1, 50.0, block)));
        }
        let event = transfer_event(1, 2, 50.0, 103);

        assert!(detector.detect(&event, &ledger, &mut ctx).is_empty());
    }

    #[test]
    fn small_volume_is_ignored() {
        let mut ledger = MovementLedger::new(100);
        let mut ctx = EventContext::default();
        let mut detector = detector();

        for block in 100..105u64 {
            ledger.record(Arc::new(transfer_event(1, 2, 1.0, block)));
        }
        let event = transfer_event(1, 2, 1.0, 104);

        assert!(detector.detect(&event, &ledger, &mut ctx).is_empty());
    }

    #[test]
    fn long_biased_history_upgrades_pattern_and_severity() {
        let mut ledger = MovementLedger::new(100);
        let mut ctx = EventContext::default();
        let mut detector = detector();

        for block in 100..112u64 {
            ledger.record(Arc::new(transfer_event(1, 2, 200.0, block)));
        }
        let event = transfer_event(1, 2, 200.0, 111);

        let alerts = detector.detect(&event, &ledger, &mut ctx);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Consistent Outflow Pattern Detected");
        assert_eq!(alerts[0].data["pattern_type"], Value::from("long_term_biased"));
        assert_eq!(alerts[0].severity, Severity::High);
    }
}
