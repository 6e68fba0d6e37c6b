//! Classifies DEX trades and, depending on configuration, focuses the
//! pipeline on them or drops them as noise. The verdict always lands in
//! the context for downstream detectors.

use serde::Deserialize;
use tracing::debug;

use super::{default_true, MovementFilter};
use crate::{
    chains,
    strategies::token_movement::{EventContext, MovementLedger},
    types::TokenTransferEvent,
};

/// Swap-sized magnitudes that show up constantly in DEX fills.
const COMMON_SWAP_AMOUNTS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DexTradeFilterConfig {
    pub enabled: bool,
    /// Drop DEX trades (noise reduction).
    pub filter_dex_trades: bool,
    /// Drop everything that is not a DEX trade (arbitrage focus).
    pub only_dex_trades: bool,
}

impl Default for DexTradeFilterConfig {
    fn default() -> Self {
        Self { enabled: default_true(), filter_dex_trades: false, only_dex_trades: false }
    }
}

pub struct DexTradeFilter {
    config: DexTradeFilterConfig,
}

impl DexTradeFilter {
    pub fn new(config: DexTradeFilterConfig) -> Self {
        Self { config }
    }

    pub fn is_likely_dex_trade(&self, event: &TokenTransferEvent) -> bool {
        if chains::is_known_dex(event.chain_id, event.from_address)
            || chains::is_known_dex(event.chain_id, event.to_address)
        {
            return true;
        }

        if event.has_contract_interaction
            && (chains::is_likely_contract(event.from_address)
                || chains::is_likely_contract(event.to_address))
        {
            return true;
        }

        let value = event.formatted_value;
        let is_round_number = value == value.trunc()
            || (value - (value * 10.0).round() / 10.0).abs() < 0.01
            || (value - (value / 10.0).round() * 10.0).abs() < 1.0;
        let is_common_amount =
            COMMON_SWAP_AMOUNTS.iter().any(|amount| ((value - amount) / amount).abs() < 0.05);
        let is_common_token = chains::is_common_dex_token(&event.token_symbol);

        (is_round_number && is_common_amount)
            || (is_common_token && (is_round_number || is_common_amount))
    }
}

impl MovementFilter for DexTradeFilter {
    fn name(&self) -> &'static str {
        "dex_trade"
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
        let is_dex_trade = self.is_likely_dex_trade(event);
        ctx.is_dex_trade = is_dex_trade;

        if ctx.touches_watched_entity() {
            return false;
        }

        if self.config.only_dex_trades && !is_dex_trade {
            debug!("Filtering non-DEX trade: {:#x}", event.transaction_hash);
            return true;
        }
        if self.config.filter_dex_trades && is_dex_trade {
            debug!("Filtering DEX trade: {:#x}", event.transaction_hash);
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::token_movement::test_support::transfer_event;

    fn filter(config: DexTradeFilterConfig) -> DexTradeFilter {
        DexTradeFilter::new(config)
    }

    #[test]
    fn known_router_endpoint_is_a_dex_trade() {
        let filter = filter(DexTradeFilterConfig::default());
        let mut event = transfer_event(1, 2, 7.37, 100);
        event.to_address = "0xe592427a0aece92de3edee1f18e0157c05861564".parse().unwrap();
        assert!(filter.is_likely_dex_trade(&event));
    }

    #[test]
    fn round_common_amounts_look_like_swaps() {
        let filter = filter(DexTradeFilterConfig::default());

        let swap = transfer_event(1, 2, 100.0, 100);
        assert!(filter.is_likely_dex_trade(&swap));

        let mut odd = transfer_event(1, 2, 73.691, 100);
        odd.token_symbol = "OBSCURE".to_string();
        assert!(!filter.is_likely_dex_trade(&odd));
    }

    #[test]
    fn verdict_is_written_even_when_nothing_drops() {
        let ledger = MovementLedger::new(100);
        let filter = filter(DexTradeFilterConfig::default());
        let mut ctx = EventContext::default();

        let event = transfer_event(1, 2, 100.0, 100);
        assert!(!filter.should_filter(&event, &ledger, &mut ctx));
        assert!(ctx.is_dex_trade);
    }

    #[test]
    fn only_dex_trades_drops_the_rest() {
        let ledger = MovementLedger::new(100);
        let filter = filter(DexTradeFilterConfig {
            only_dex_trades: true,
            ..DexTradeFilterConfig::default()
        });
        let mut ctx = EventContext::default();

        let mut odd = transfer_event(1, 2, 73.691, 100);
        odd.token_symbol = "OBSCURE".to_string();
        assert!(filter.should_filter(&odd, &ledger, &mut ctx));

        let swap = transfer_event(1, 2, 100.0, 100);
        assert!(!filter.should_filter(&swap, &ledger, &mut ctx));
    }

    #[test]
    fn filter_dex_trades_drops_swaps_but_not_watched() {
        let ledger = MovementLedger::new(100);
        let filter = filter(DexTradeFilterConfig {
            filter_dex_trades: true,
            ..DexTradeFilterConfig::default()
        });

        let swap = transfer_event(1, 2, 100.0, 100);
        let mut ctx = EventContext::default();
        assert!(filter.should_filter(&swap, &ledger, &mut ctx));

        let mut watched_ctx = EventContext { is_watched_to: true, ..EventContext::default() };
        assert!(!filter.should_filter(&swap, &ledger, &mut watched_ctx));
        assert!(watched_ctx.is_dex_trade);
    }
}
