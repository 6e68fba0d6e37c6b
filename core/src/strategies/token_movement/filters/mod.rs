//! Filter plugins. Filters run before statistics and detection and can
//! short-circuit analysis of an event; watched entities always pass.

pub mod dex_trade;
pub mod simple_transfer;
pub mod small_transfer;
pub mod whitelist;

use serde::Deserialize;

use super::{EventContext, MovementLedger};
use crate::types::TokenTransferEvent;

pub use dex_trade::{DexTradeFilter, DexTradeFilterConfig};
pub use simple_transfer::{SimpleTransferFilter, SimpleTransferFilterConfig};
pub use small_transfer::{SmallTransferFilter, SmallTransferFilterConfig};
pub use whitelist::{WhitelistFilter, WhitelistFilterConfig};

pub trait MovementFilter: Send + Sync {
    fn name(&self) -> &'static str;
    fn enabled(&self) -> bool;

    /// True when the event should be dropped. Filters may also write
    /// classification verdicts into the shared context.
    fn should_filter(
        &self,
        event: &TokenTransferEvent,
        ledger: &MovementLedger,
        ctx: &mut EventContext,
    ) -> bool;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    pub whitelist: WhitelistFilterConfig,
    pub small_transfer: SmallTransferFilterConfig,
    pub simple_transfer: SimpleTransferFilterConfig,
    pub dex_trade: DexTradeFilterConfig,
}

pub(crate) fn default_true() -> bool {
    true
}
