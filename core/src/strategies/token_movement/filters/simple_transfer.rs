//! Drops plain EOA-to-EOA transfers that carry nothing significant.

use serde::Deserialize;
use tracing::debug;

use super::{default_true, MovementFilter};
use crate::{
    chains,
    strategies::token_movement::{EventContext, MovementLedger},
    types::TokenTransferEvent,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimpleTransferFilterConfig {
    pub enabled: bool,
    /// Keep EOA-to-EOA transfers only when they classify as significant.
    pub require_significant: bool,
}

impl Default for SimpleTransferFilterConfig {
    fn default() -> Self {
        Self { enabled: default_true(), require_significant: true }
    }
}

pub struct SimpleTransferFilter {
    config: SimpleTransferFilterConfig,
}

impl SimpleTransferFilter {
    pub fn new(config: SimpleTransferFilterConfig) -> Self {
        Self { config }
    }
}

impl MovementFilter for SimpleTransferFilter {
    fn name(&self) -> &'static str {
        "simple_transfer"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn should_filter(
        &self,
        event: &TokenTransferEvent,
        _ledger: &MovementLedger,
        ctx: &mut EventContext,
    ) -> bool {
        if ctx.touches_watched_entity() || event.has_contract_interaction {
            return false;
        }

        let is_eoa_transfer = !chains::is_likely_contract(event.from_address)
            && !chains::is_likely_contract(event.to_address);

        if is_eoa_transfer && self.config.require_significant && !ctx.is_significant_transfer {
            debug!(
                "Filtering simple transfer between EOAs: {:#x}",
                event.transaction_hash
            );
            return true;
        }

        false
    }
}
