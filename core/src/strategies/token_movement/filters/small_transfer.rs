//! Drops transfers that are small relative to the token's own history.

use serde::Deserialize;
use tracing::debug;

use super::{default_true, MovementFilter};
use crate::{
    strategies::token_movement::{stats::TokenKey, EventContext, MovementLedger},
    types::TokenTransferEvent,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmallTransferFilterConfig {
    pub enabled: bool,
    pub filter_small_transfers: bool,
    /// Fraction of the token's average transfer below which an event is
    /// noise.
    pub small_transfer_threshold: f64,
    /// Samples required before the average is trusted.
    pub min_stats_count: u64,
}

impl Default for SmallTransferFilterConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            filter_small_transfers: true,
            small_transfer_threshold: 0.1,
            min_stats_count: 100,
        }
    }
}

pub struct SmallTransferFilter {
    config: SmallTransferFilterConfig,
}

impl SmallTransferFilter {
    pub fn new(config: SmallTransferFilterConfig) -> Self {
        Self { config }
    }
}

impl MovementFilter for SmallTransferFilter {
    fn name(&self) -> &'static str {
        "small_transfer"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn should_filter(
        &self,
        event: &TokenTransferEvent,
        ledger: &MovementLedger,
        ctx: &mut EventContext,
    ) -> bool {
        if !self.config.filter_small_transfers {
            return false;
        }
        if ctx.touches_watched_entity() {
            return false;
        }

        let Some(stats) = ledger.token_stats_for(TokenKey::from(event.token_address)) else {
            return false;
        };
        if stats.transfer_count <= self.config.min_stats_count {
            return false;
        }

        if event.formatted_value < stats.avg_transfer * self.config.small_transfer_threshold {
            debug!(
                "Filtering small transfer: {} {} (avg: {})",
                event.formatted_value, event.token_symbol, stats.avg_transfer
            );
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::token_movement::test_support::transfer_event;
    use std::sync::Arc;

    fn seeded_ledger(samples: u64, value: f64) -> MovementLedger {
        let mut ledger = MovementLedger::new(100);
        for block in 0..samples {
            ledger.record(Arc::new(transfer_event(1, 2, value, block)));
        }
        ledger
    }

    #[test]
    fn drops_below_threshold_once_stats_are_established() {
        let ledger = seeded_ledger(101, 100.0);
        let filter = SmallTransferFilter::new(SmallTransferFilterConfig::default());
        let mut ctx = EventContext::default();

        // 5.0 is below 10% of the 100.0 average.
        let small = transfer_event(1, 2, 5.0, 200);
        assert!(filter.should_filter(&small, &ledger, &mut ctx));

        let normal = transfer_event(1, 2, 50.0, 200);
        assert!(!filter.should_filter(&normal, &ledger, &mut ctx));
    }

    #[test]
    fn passes_everything_until_enough_samples() {
        let ledger = seeded_ledger(10, 100.0);
        let filter = SmallTransferFilter::new(SmallTransferFilterConfig::default());
        let mut ctx = EventContext::default();

        let small = transfer_event(1, 2, 0.001, 200);
        assert!(!filter.should_filter(&small, &ledger, &mut ctx));
    }

    #[test]
    fn watched_entities_bypass() {
        let ledger = seeded_ledger(101, 100.0);
        let filter = SmallTransferFilter::new(SmallTransferFilterConfig::default());
        let mut ctx = EventContext { is_watched_token: true, ..EventContext::default() };

        let small = transfer_event(1, 2, 0.001, 200);
        assert!(!filter.should_filter(&small, &ledger, &mut ctx));
    }
}
