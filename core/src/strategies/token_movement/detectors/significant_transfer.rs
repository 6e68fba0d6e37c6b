//! Significant transfer detection: transfers above a per-chain, per-token
//! threshold with sensible fallbacks.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{base_alert_data, default_true, MovementDetector, ALERT_SOURCE};
use crate::{
    chains,
    strategies::token_movement::{EventContext, MovementLedger},
    types::{Alert, Severity, TokenTransferEvent},
};

/// Contract-interaction transfers use half the normal threshold.
const CONTRACT_INTERACTION_MULTIPLIER: f64 = 0.5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignificantTransferConfig {
    pub enabled: bool,
    /// `chain id (decimal string) -> token symbol (or "DEFAULT") -> threshold`.
    pub thresholds: HashMap<String, HashMap<String, f64>>,
    pub default_threshold: f64,
    pub stablecoin_threshold: f64,
}

impl Default for SignificantTransferConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            thresholds: HashMap::new(),
            default_threshold: 100.0,
            stablecoin_threshold: 5000.0,
        }
    }
}

impl SignificantTransferConfig {
    /// Resolution order: per-chain-per-token threshold, per-chain `DEFAULT`,
    /// built-in default (stablecoins get the higher built-in).
    pub fn is_significant(&self, event: &TokenTransferEvent) -> bool {
        let multiplier = if event.has_contract_interaction {
            CONTRACT_INTERACTION_MULTIPLIER
        } else {
            1.0
        };

        let configured = self
            .thresholds
            .get(&event.chain_id.to_string())
            .and_then(|chain| chain.get(&event.token_symbol).or_else(|| chain.get("DEFAULT")));

        let threshold = match configured {
            Some(threshold) => *threshold,
            None => {
                if chains::is_stablecoin(event.chain_id, event.token_address, &event.token_symbol)
                {
                    self.stablecoin_threshold
                } else {
                    self.default_threshold
                }
            }
        };

        event.formatted_value >= threshold * multiplier
    }
}

pub struct SignificantTransferDetector {
    config: SignificantTransferConfig,
}

impl SignificantTransferDetector {
    pub fn new(config: SignificantTransferConfig) -> Self {
        Self { config }
    }
}

impl MovementDetector for SignificantTransferDetector {
    fn name(&self) -> &'static str {
        "significant_transfer"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn detect(
        &mut self,
        event: &TokenTransferEvent,
        _ledger: &MovementLedger,
        ctx: &mut EventContext,
    ) -> Vec<Alert> {
        let is_significant = self.config.is_significant(event);
        ctx.is_significant_transfer = is_significant;

        if !is_significant {
            return Vec::new();
        }

        let contract_info =
            if event.has_contract_interaction { " with contract interaction" } else { "" };

        info!(
            "Significant transfer{contract_info} detected: {} {}",
            event.formatted_value, event.token_symbol
        );

        let mut data = base_alert_data(event);
        data.insert(
            "has_contract_interaction".to_string(),
            Value::from(event.has_contract_interaction),
        );

        vec![Alert::new(
            format!("Significant Token Transfer{contract_info}"),
            format!(
                "Large transfer of {} {} detected{contract_info}",
                event.formatted_value, event.token_symbol
            ),
            Severity::Medium,
            ALERT_SOURCE,
            data,
        )]
    }
}
