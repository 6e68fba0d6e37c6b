//! Drops routine transfers involving whitelisted addresses (exchanges,
//! known protocols) unless something about the transfer still matters.

use alloy::primitives::Address;
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
pub struct WhitelistFilterConfig {
    pub enabled: bool,
    pub addresses: Vec<Address>,
}

impl Default for WhitelistFilterConfig {
    fn default() -> Self {
        Self { enabled: default_true(), addresses: Vec::new() }
    }
}

pub struct WhitelistFilter {
    config: WhitelistFilterConfig,
}

impl WhitelistFilter {
    pub fn new(config: WhitelistFilterConfig) -> Self {
        Self { config }
    }

    fn is_whitelisted(&self, chain_id: u64, address: Address) -> bool {
        self.config.addresses.contains(&address) || chains::is_known_dex(chain_id, address)
    }
}

impl MovementFilter for WhitelistFilter {
    fn name(&self) -> &'static str {
        "whitelist"
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
        // Watched entities and contract interactions always pass.
        if ctx.touches_watched_entity() || event.has_contract_interaction {
            return false;
        }

        if self.is_whitelisted(event.chain_id, event.from_address)
            || self.is_whitelisted(event.chain_id, event.to_address)
        {
            debug!(
                "Filtering transfer involving whitelisted address: {:#x}",
                event.transaction_hash
            );
            return true;
        }

        false
    }
}
