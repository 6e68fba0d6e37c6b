//! Token movement analysis for a single chain.
//!
//! Events are prepared, run through a filter cascade, folded into rolling
//! statistics and then handed to a plugin set of detectors. Alerts pass a
//! per-detector throttle and an in-batch deduplication before they leave
//! as actions.

pub mod detectors;
pub mod filters;
pub mod stats;

use std::collections::{HashMap, HashSet};

use alloy::primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use self::{
    detectors::{
        ContinuousFlowDetector, DetectorsConfig, HighFrequencyDetector, MovementDetector,
        MultiHopDetector, PeriodicTransferDetector, SignificantTransferConfig,
        SignificantTransferDetector, WashTradingDetector, ALERT_SOURCE,
    },
    filters::{
        DexTradeFilter, FiltersConfig, MovementFilter, SimpleTransferFilter, SmallTransferFilter,
        WhitelistFilter,
    },
};
pub use stats::{MovementLedger, TokenKey};
use super::{Strategy, StrategyError};
use crate::{
    chains,
    erc20::format_units,
    types::{Action, Alert, Event, Severity, TokenTransferEvent},
};

pub const COMPONENT_NAME: &str = "token_movement";

/// Per-event verdicts shared between filters and detectors.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub is_watched_from: bool,
    pub is_watched_to: bool,
    pub is_watched_token: bool,
    pub is_high_interest_token: bool,
    pub is_dex_trade: bool,
    pub is_significant_transfer: bool,
}

impl EventContext {
    pub fn touches_watched_entity(&self) -> bool {
        self.is_watched_from || self.is_watched_to || self.is_watched_token
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    pub alert_cooldown_secs: i64,
    pub watched_addresses: Vec<Address>,
    pub watched_tokens: Vec<Address>,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self { alert_cooldown_secs: 300, watched_addresses: Vec::new(), watched_tokens: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenMovementConfig {
    /// The single chain this strategy instance analyzes.
    pub chain_id: u64,
    #[serde(default)]
    pub strategy: StrategySettings,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub detectors: DetectorsConfig,
}

pub struct TokenMovementStrategy {
    chain_id: u64,
    chain_name: String,
    watched_addresses: HashSet<Address>,
    watched_tokens: HashSet<Address>,
    significance: SignificantTransferConfig,
    filters: Vec<Box<dyn MovementFilter>>,
    detectors: Vec<Box<dyn MovementDetector>>,
    ledger: MovementLedger,
    alert_cooldown: Duration,
    last_alert_time: HashMap<String, DateTime<Utc>>,
}

impl TokenMovementStrategy {
    pub fn new(config: TokenMovementConfig) -> Self {
        let chain_id = config.chain_id;
        let chain_name = chains::chain_name(chain_id);

        // Cascade order matters: whitelist, small, simple, dex.
        let filters: Vec<Box<dyn MovementFilter>> = vec![
            Box::new(WhitelistFilter::new(config.filters.whitelist)),
            Box::new(SmallTransferFilter::new(config.filters.small_transfer)),
            Box::new(SimpleTransferFilter::new(config.filters.simple_transfer)),
            Box::new(DexTradeFilter::new(config.filters.dex_trade)),
        ];

        let significance = config.detectors.significant_transfer.clone();
        let window_size = config.detectors.high_frequency.window_size;
        let detectors: Vec<Box<dyn MovementDetector>> = vec![
            Box::new(SignificantTransferDetector::new(config.detectors.significant_transfer)),
            Box::new(HighFrequencyDetector::new(config.detectors.high_frequency)),
            Box::new(ContinuousFlowDetector::new(config.detectors.continuous_flow)),
            Box::new(PeriodicTransferDetector::new(config.detectors.periodic_transfer)),
            Box::new(MultiHopDetector::new(config.detectors.multi_hop)),
            Box::new(WashTradingDetector::new(config.detectors.wash_trading)),
        ];

        info!(
            "TokenMovementStrategy initialized for chain {chain_name} (ID: {chain_id}) with {} detectors and {} filters",
            detectors.len(),
            filters.len()
        );

        Self {
            chain_id,
            chain_name,
            watched_addresses: config.strategy.watched_addresses.into_iter().collect(),
            watched_tokens: config.strategy.watched_tokens.into_iter().collect(),
            significance,
            filters,
            detectors,
            ledger: MovementLedger::new(window_size),
            alert_cooldown: Duration::seconds(config.strategy.alert_cooldown_secs),
            last_alert_time: HashMap::new(),
        }
    }

    /// Fill in token symbol and formatted value when the collector could
    /// not resolve them.
    fn prepare_event(&self, event: &TokenTransferEvent) -> TokenTransferEvent {
        let mut prepared = event.clone();

        if prepared.token_symbol.is_empty() {
            prepared.token_symbol = match prepared.token_address {
                None => chains::native_symbol(self.chain_id).to_string(),
                Some(address) => self
                    .ledger
                    .token_stats_for(TokenKey::Token(address))
                    .map(|stats| stats.token_symbol.clone())
                    .unwrap_or_else(|| "ERC20".to_string()),
            };
            debug!("Initialized token symbol: {}", prepared.token_symbol);
        }

        if prepared.formatted_value == 0.0 && !prepared.value.is_zero() {
            let decimals = if prepared.is_native {
                chains::native_decimals(self.chain_id)
            } else if prepared.token_decimals > 0 {
                prepared.token_decimals
            } else {
                18
            };
            prepared.formatted_value = format_units(prepared.value, decimals);
            debug!("Initialized formatted value: {}", prepared.formatted_value);
        }

        prepared
    }

    /// Event-time throttle: a key may alert at most once per cooldown.
    fn should_alert(&mut self, alert_key: &str, event_time: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_alert_time.get(alert_key) {
            if event_time.signed_duration_since(*last) < self.alert_cooldown {
                return false;
            }
        }
        self.last_alert_time.insert(alert_key.to_string(), event_time);
        true
    }

    fn watched_activity_alert(
        &self,
        event: &TokenTransferEvent,
        ctx: &EventContext,
    ) -> Option<Alert> {
        if !ctx.touches_watched_entity() {
            return None;
        }
        // Plain watched hits are noise; require significance, a DEX trade
        // or a high-interest token.
        if !(ctx.is_significant_transfer || ctx.is_dex_trade || ctx.is_high_interest_token) {
            return None;
        }

        let mut watch_type = Vec::new();
        if ctx.is_watched_from || ctx.is_watched_to {
            watch_type.push("address");
        }
        if ctx.is_watched_token {
            watch_type.push("token");
        }

        let mut watched_items = Vec::new();
        if ctx.is_watched_from {
            watched_items.push(format!("from:{:#x}", event.from_address));
        }
        if ctx.is_watched_to {
            watched_items.push(format!("to:{:#x}", event.to_address));
        }
        if ctx.is_watched_token {
            if let Some(token) = event.token_address {
                watched_items.push(format!("token:{token:#x}"));
            }
        }

        let mut alert_context = Vec::new();
        if ctx.is_significant_transfer {
            alert_context.push("significant transfer");
        }
        if ctx.is_dex_trade {
            alert_context.push("DEX trade");
        }
        if ctx.is_high_interest_token {
            alert_context.push("high interest token");
        }

        info!(
            "Transfer involving watched {} detected: {}",
            watch_type.join("/"),
            watched_items.join(", ")
        );

        let mut data = detectors::base_alert_data(event);
        data.insert("from_watched".to_string(), Value::from(ctx.is_watched_from));
        data.insert("to_watched".to_string(), Value::from(ctx.is_watched_to));
        data.insert("token_watched".to_string(), Value::from(ctx.is_watched_token));
        data.insert("high_interest_token".to_string(), Value::from(ctx.is_high_interest_token));
        data.insert("is_dex_trade".to_string(), Value::from(ctx.is_dex_trade));
        data.insert("is_significant".to_string(), Value::from(ctx.is_significant_transfer));

        Some(Alert::new(
            format!(
                "Watched {} Activity: {}",
                watch_type.join(", "),
                alert_context.join(", ")
            ),
            format!(
                "Transfer involving watched {} {}",
                watch_type.join("/"),
                watched_items.join(", ")
            ),
            Severity::Medium,
            ALERT_SOURCE,
            data,
        ))
    }

    /// Run the full cascade for one transfer and return surviving alerts.
    pub fn analyze_event(&mut self, event: TokenTransferEvent) -> Vec<Alert> {
        if event.chain_id != self.chain_id {
            warn!(
                "Received event from chain {}, but this strategy handles {} (chain {})",
                event.chain_id, self.chain_name, self.chain_id
            );
            return Vec::new();
        }

        let event = self.prepare_event(&event);
        debug!(
            "Processing token transfer: chain={}, tx={:#x}, from={:#x}, to={:#x}",
            event.chain_id, event.transaction_hash, event.from_address, event.to_address
        );

        let mut ctx = EventContext {
            is_watched_from: self.watched_addresses.contains(&event.from_address),
            is_watched_to: self.watched_addresses.contains(&event.to_address),
            is_watched_token: event
                .token_address
                .is_some_and(|token| self.watched_tokens.contains(&token)),
            is_high_interest_token: chains::is_high_interest_token(
                self.chain_id,
                event.token_address,
            ),
            is_dex_trade: false,
            // Classified up front so the filters can rely on it; the
            // significant-transfer detector re-derives and re-writes it.
            is_significant_transfer: self.significance.is_significant(&event),
        };

        for filter in &self.filters {
            if filter.enabled() && filter.should_filter(&event, &self.ledger, &mut ctx) {
                debug!("Event filtered by {}: {:#x}", filter.name(), event.transaction_hash);
                return Vec::new();
            }
        }

        let event = Arc::new(event);
        self.ledger.record(Arc::clone(&event));

        let mut alerts = Vec::new();
        if let Some(alert) = self.watched_activity_alert(&event, &ctx) {
            alerts.push(alert);
        }

        for index in 0..self.detectors.len() {
            if !self.detectors[index].enabled() {
                continue;
            }
            let batch = self.detectors[index].detect(&event, &self.ledger, &mut ctx);
            if batch.is_empty() {
                continue;
            }

            let detector_name = self.detectors[index].name();
            for alert in batch {
                let mut alert_key = format!(
                    "{detector_name}:{}:{}",
                    event.chain_id,
                    TokenKey::from(event.token_address)
                );
                if let Some(pattern) = alert.data.get("pattern_type").and_then(Value::as_str) {
                    alert_key.push(':');
                    alert_key.push_str(pattern);
                }

                if self.should_alert(&alert_key, event.block_timestamp) {
                    alerts.push(alert);
                } else {
                    debug!("Alert from {detector_name} rate-limited: {alert_key}");
                }
            }
        }

        deduplicate_alerts(alerts)
    }

    #[cfg(test)]
    pub(crate) fn ledger(&self) -> &MovementLedger {
        &self.ledger
    }
}

/// Drop duplicate alerts within one event's batch by signature.
fn deduplicate_alerts(alerts: Vec<Alert>) -> Vec<Alert> {
    let mut seen = HashSet::new();
    let mut deduplicated = Vec::with_capacity(alerts.len());
    let mut duplicates = 0usize;

    for alert in alerts {
        if seen.insert(alert.signature()) {
            deduplicated.push(alert);
        } else {
            duplicates += 1;
        }
    }

    if duplicates > 0 {
        debug!("Removed {duplicates} duplicate alerts");
    }
    deduplicated
}

#[async_trait]
impl Strategy for TokenMovementStrategy {
    fn name(&self) -> &'static str {
        COMPONENT_NAME
    }

    async fn process_event(&mut self, event: &Event) -> Result<Vec<Action>, StrategyError> {
        let Event::TokenTransfer(transfer) = event else {
            return Ok(Vec::new());
        };

        let alerts = self.analyze_event(transfer.clone());
        if !alerts.is_empty() {
            info!(
                "Generated {} alerts for token transfer: chain={}, tx={:#x}",
                alerts.len(),
                transfer.chain_id,
                transfer.transaction_hash
            );
        }

        Ok(alerts.into_iter().map(Alert::into_action).collect())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use alloy::primitives::{Address, B256, U256};
    use chrono::{DateTime, TimeZone, Utc};

    use crate::types::TokenTransferEvent;

    pub fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().expect("valid fixture time")
    }

    /// Native transfer fixture; timestamps advance 12 seconds per block.
    pub fn transfer_event(from: u8, to: u8, value: f64, block: u64) -> TokenTransferEvent {
        TokenTransferEvent {
            chain_id: 1,
            token_address: None,
            token_name: "ETH".to_string(),
            token_symbol: "ETH".to_string(),
            token_decimals: 18,
            from_address: Address::repeat_byte(from),
            to_address: Address::repeat_byte(to),
            value: U256::from((value * 1e18) as u128),
            formatted_value: value,
            transaction_hash: tx_hash(from, to, block),
            block_number: block,
            block_timestamp: base_time() + chrono::Duration::seconds(block as i64 * 12),
            log_index: None,
            is_native: true,
            has_contract_interaction: false,
        }
    }

    pub fn erc20_transfer_event(
        from: u8,
        to: u8,
        value: f64,
        block: u64,
        token: u8,
    ) -> TokenTransferEvent {
        let mut event = transfer_event(from, to, value, block);
        event.token_address = Some(Address::repeat_byte(token));
        event.token_name = "Test Token".to_string();
        event.token_symbol = "TST".to_string();
        event.is_native = false;
        event.log_index = Some(0);
        event
    }

    fn tx_hash(from: u8, to: u8, block: u64) -> B256 {
        let mut bytes = [0u8; 32];
        bytes[0] = from;
        bytes[1] = to;
        bytes[24..].copy_from_slice(&block.to_be_bytes());
        B256::from(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::{test_support::*, *};

    fn default_config() -> TokenMovementConfig {
        TokenMovementConfig {
            chain_id: 1,
            strategy: StrategySettings::default(),
            filters: FiltersConfig::default(),
            detectors: DetectorsConfig::default(),
        }
    }

    fn strategy() -> TokenMovementStrategy {
        TokenMovementStrategy::new(default_config())
    }

    #[test]
    fn significant_native_transfer_raises_one_alert() {
        let mut strategy = strategy();

        let event = transfer_event(0xaa, 0xbb, 150.0, 100);
        let alerts = strategy.analyze_event(event);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Significant Token Transfer");
        assert_eq!(alerts[0].severity, Severity::Medium);
    }

    #[test]
    fn insignificant_eoa_transfer_is_filtered_before_stats() {
        let mut strategy = strategy();

        // Oddly sized so the DEX heuristics stay quiet too.
        let mut event = transfer_event(0xaa, 0xbb, 7.777, 100);
        event.token_symbol = "OBSCURE".to_string();

        assert!(strategy.analyze_event(event).is_empty());
        assert!(strategy.ledger().token_stats.is_empty(), "filtered events must not be recorded");
    }

    #[test]
    fn wash_trading_fires_on_third_back_and_forth() {
        let mut strategy = strategy();

        let first = strategy.analyze_event(transfer_event(0xaa, 0xbb, 150.0, 100));
        assert!(first.iter().any(|a| a.title == "Significant Token Transfer"));

        let second = strategy.analyze_event(transfer_event(0xbb, 0xaa, 150.0, 101));
        assert!(second.iter().all(|a| a.title != "Potential Wash Trading Detected"));

        let third = strategy.analyze_event(transfer_event(0xaa, 0xbb, 150.0, 102));
        assert!(
            third.iter().any(|a| a.title == "Potential Wash Trading Detected"),
            "third leg should trip the wash trading detector, got {:?}",
            third.iter().map(|a| a.title.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn identical_alerts_within_cooldown_are_throttled() {
        let mut strategy = strategy();

        let mut first = transfer_event(0xaa, 0xbb, 150.0, 100);
        let mut second = first.clone();
        // 10 seconds apart, well inside the 300 second cooldown.
        second.block_timestamp = first.block_timestamp + chrono::Duration::seconds(10);
        second.block_number = 101;
        first.has_contract_interaction = false;
        second.has_contract_interaction = false;

        assert_eq!(strategy.analyze_event(first).len(), 1);
        assert!(strategy.analyze_event(second).is_empty());
    }

    #[test]
    fn alerts_past_cooldown_fire_again() {
        let mut strategy = strategy();

        let first = transfer_event(0xaa, 0xbb, 150.0, 100);
        let mut later = first.clone();
        later.block_number = 200;
        later.block_timestamp = first.block_timestamp + chrono::Duration::seconds(300);

        assert_eq!(strategy.analyze_event(first).len(), 1);
        let again = strategy.analyze_event(later);
        assert!(again.iter().any(|a| a.title == "Significant Token Transfer"));
    }

    #[test]
    fn watched_address_alerts_only_with_a_qualifying_category() {
        let mut config = default_config();
        config.strategy.watched_addresses = vec![alloy::primitives::Address::repeat_byte(0xaa)];
        let mut strategy = TokenMovementStrategy::new(config);

        // Watched but routine: odd size, not significant, not a DEX shape.
        let mut routine = transfer_event(0xaa, 0xbb, 3.137, 100);
        routine.token_symbol = "OBSCURE".to_string();
        let alerts = strategy.analyze_event(routine);
        assert!(alerts.iter().all(|a| !a.title.starts_with("Watched")));

        // Watched and significant: the combined alert joins the batch.
        let significant = transfer_event(0xaa, 0xbb, 500.0, 101);
        let alerts = strategy.analyze_event(significant);
        assert!(alerts.iter().any(|a| a.title.starts_with("Watched address Activity")));
        assert!(alerts.iter().any(|a| a.title == "Significant Token Transfer"));
    }

    #[test]
    fn cross_chain_events_are_rejected() {
        let mut strategy = strategy();
        let mut event = transfer_event(0xaa, 0xbb, 150.0, 100);
        event.chain_id = 56;
        assert!(strategy.analyze_event(event).is_empty());
    }

    #[test]
    fn prepare_fills_missing_symbol_and_value() {
        let strategy = strategy();

        let mut event = transfer_event(0xaa, 0xbb, 0.0, 100);
        event.token_symbol = String::new();
        event.value = alloy::primitives::U256::from(3_000_000_000_000_000_000u128);

        let prepared = strategy.prepare_event(&event);
        assert_eq!(prepared.token_symbol, "ETH");
        assert_eq!(prepared.formatted_value, 3.0);
    }

    #[test]
    fn duplicate_alerts_collapse_by_signature() {
        let event = transfer_event(0xaa, 0xbb, 150.0, 100);
        let data = detectors::base_alert_data(&event);

        let alert_a = Alert::new("Same", "one", Severity::Info, ALERT_SOURCE, data.clone());
        let alert_b = Alert::new("Same", "two", Severity::Info, ALERT_SOURCE, data.clone());
        let alert_c = Alert::new("Different", "three", Severity::Info, ALERT_SOURCE, data);

        let deduplicated = deduplicate_alerts(vec![alert_a, alert_b, alert_c]);
        assert_eq!(deduplicated.len(), 2);
    }

    #[tokio::test]
    async fn strategy_wraps_alerts_into_actions() {
        let mut strategy = strategy();
        let event = Event::TokenTransfer(transfer_event(0xaa, 0xbb, 150.0, 100));

        let actions = strategy.process_event(&event).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, "alert");
        assert_eq!(
            actions[0].get("title"),
            Some(&Value::from("Significant Token Transfer"))
        );

        // Non-transfer events produce nothing.
        let web3 = Event::Web3Log(crate::types::Web3LogEvent {
            chain_id: 1,
            contract_address: alloy::primitives::Address::ZERO,
            topics: Vec::new(),
            data: alloy::primitives::Bytes::new(),
            transaction_hash: alloy::primitives::B256::ZERO,
            block_number: 1,
            block_timestamp: base_time(),
            log_index: None,
        });
        assert!(strategy.process_event(&web3).await.unwrap().is_empty());
    }

    #[test]
    fn config_parses_from_yaml() {
        let yaml = r#"
chain_id: 1
strategy:
  alert_cooldown_secs: 120
  watched_addresses:
    - "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
filters:
  dex_trade:
    only_dex_trades: true
detectors:
  significant_transfer:
    default_threshold: 1.0
    thresholds:
      "1":
        ETH: 1.0
        DEFAULT: 50.0
  wash_trading:
    back_and_forth_threshold: 5
"#;
        let config: TokenMovementConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.strategy.alert_cooldown_secs, 120);
        assert_eq!(config.strategy.watched_addresses.len(), 1);
        assert!(config.filters.dex_trade.only_dex_trades);
        assert_eq!(config.detectors.significant_transfer.default_threshold, 1.0);
        assert_eq!(config.detectors.wash_trading.back_and_forth_threshold, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.detectors.high_frequency.threshold, 20);
        assert!(config.filters.whitelist.enabled);
    }
}
