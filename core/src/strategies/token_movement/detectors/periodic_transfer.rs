//! Periodic (cron-like) outbound transfer detection based on the
//! regularity of inter-arrival block intervals.

use std::collections::{BTreeSet, HashMap};

use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{base_alert_data, default_true, MovementDetector, ALERT_SOURCE};
use crate::{
    chains,
    strategies::token_movement::{stats::TokenKey, EventContext, MovementLedger},
    types::{Alert, Severity, TokenTransferEvent},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PeriodicTransferConfig {
    pub enabled: bool,
    pub min_transfers: usize,
    /// Maximum coefficient of variation (stdev/mean) of the intervals.
    pub max_variation: f64,
    pub window_days: i64,
}

impl Default for PeriodicTransferConfig {
    fn default() -> Self {
        Self { enabled: default_true(), min_transfers: 4, max_variation: 0.25, window_days: 7 }
    }
}

pub struct PeriodicTransferDetector {
    config: PeriodicTransferConfig,
}

impl PeriodicTransferDetector {
    pub fn new(config: PeriodicTransferConfig) -> Self {
        Self { config }
    }
}

impl MovementDetector for PeriodicTransferDetector {
    fn name(&self) -> &'static str {
        "periodic_transfer"
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
        let window_start = event.block_timestamp - Duration::days(self.config.window_days);

        // Outgoing transfers inside the window, ordered by time.
        let mut outgoing: Vec<_> = ledger
            .transfers_for_address(address)
            .iter()
            .filter(|t| t.from_address == address && t.block_timestamp >= window_start)
            .collect();
        if outgoing.len() < self.config.min_transfers {
            return Vec::new();
        }
        outgoing.sort_by_key(|t| (t.block_timestamp, t.block_number));

        // Inter-arrival intervals in blocks; same-block transfers ignored.
        let intervals: Vec<f64> = outgoing
            .windows(2)
            .filter_map(|pair| {
                let interval = pair[1].block_number.saturating_sub(pair[0].block_number);
                (interval > 0).then_some(interval as f64)
            })
            .collect();
        if intervals.len() < self.config.min_transfers - 1 {
            return Vec::new();
        }

        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let stdev = if intervals.len() > 1 {
            (intervals.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (intervals.len() - 1) as f64)
                .sqrt()
        } else {
            0.0
        };
        let variation = if mean > 0.0 { stdev / mean } else { f64::INFINITY };

        if variation > self.config.max_variation {
            return Vec::new();
        }

        let avg_interval_hours = chains::secs_from_blocks(event.chain_id, mean) / 3600.0;

        let token_addresses: BTreeSet<String> = outgoing
            .iter()
            .map(|t| TokenKey::from(t.token_address).to_string())
            .collect();

        let mut token_symbols = BTreeSet::new();
        for transfer in &outgoing {
            if !transfer.token_symbol.is_empty() {
                token_symbols.insert(transfer.token_symbol.clone());
            } else if transfer.is_native {
                token_symbols.insert(chains::native_symbol(event.chain_id).to_string());
            }
        }

        // Recipients taking at least a quarter of the transfers.
        let mut recipient_counts: HashMap<_, usize> = HashMap::new();
        for transfer in &outgoing {
            *recipient_counts.entry(transfer.to_address).or_default() += 1;
        }
        let min_count = 2.0f64.max(outgoing.len() as f64 * 0.25);
        let frequent_recipients: Vec<String> = recipient_counts
            .iter()
            .filter(|(_, count)| **count as f64 >= min_count)
            .map(|(address, _)| format!("{address:#x}"))
            .collect();

        let token_info = if token_symbols.is_empty() {
            String::new()
        } else {
            format!(" involving {}", token_symbols.iter().cloned().collect::<Vec<_>>().join(", "))
        };
        let recipient_info = if frequent_recipients.is_empty() {
            String::new()
        } else {
            format!(" to {} frequent recipients", frequent_recipients.len())
        };

        info!(
            "Periodic transfer pattern detected for address {address:#x}: ~{avg_interval_hours:.1} hours interval"
        );

        let mut data = base_alert_data(event);
        data.insert("address".to_string(), Value::from(format!("{address:#x}")));
        data.insert("pattern".to_string(), Value::from("periodic_transfers"));
        data.insert("avg_interval_blocks".to_string(), Value::from(mean));
        data.insert("avg_interval_hours".to_string(), Value::from(avg_interval_hours));
        data.insert("transfers_count".to_string(), Value::from(outgoing.len()));
        data.insert(
            "token_addresses".to_string(),
            Value::from(token_addresses.into_iter().collect::<Vec<_>>()),
        );
        data.insert(
            "token_symbols".to_string(),
            Value::from(token_symbols.into_iter().collect::<Vec<_>>()),
        );
        data.insert("variation".to_string(), Value::from(variation));
        data.insert("frequent_recipients".to_string(), Value::from(frequent_recipients));

        vec![Alert::new(
            "Periodic Transfer Pattern Detected",
            format!(
                "Address {address:#x} shows regular transfers{token_info}{recipient_info} every ~{avg_interval_hours:.1} hours"
            ),
            Severity::Medium,
            ALERT_SOURCE,
            data,
        )]
    }
}
