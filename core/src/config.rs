//! Configuration tree for the pipeline, loaded from a single YAML file.
//!
//! Components are enabled by name; each enabled name must have a matching
//! configuration section. Unknown names are fatal at startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    collectors::{
        token_transfer::TokenTransferCollectorConfig, web3_event::Web3EventCollectorConfig,
    },
    executors::{log::LogExecutorConfig, webhook::WebhookExecutorConfig},
    strategies::token_movement::TokenMovementConfig,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub dir: PathBuf,
    pub group_name: String,
    pub stats_interval_secs: u64,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/queues"),
            group_name: "sentinel".to_string(),
            stats_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    pub enabled: Vec<String>,
    pub token_transfer: Option<TokenTransferCollectorConfig>,
    pub web3_event: Option<Web3EventCollectorConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub enabled: Vec<String>,
    pub token_movement: Option<TokenMovementConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecutorsConfig {
    pub enabled: Vec<String>,
    pub log: Option<LogExecutorConfig>,
    pub webhook: Option<WebhookExecutorConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queues: QueuesConfig,
    pub collectors: CollectorsConfig,
    pub strategies: StrategiesConfig,
    pub executors: ExecutorsConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_tree_parses() {
        let yaml = r#"
queues:
  dir: /tmp/sentinel/queues
  group_name: mainnet
  stats_interval_secs: 30

collectors:
  enabled: [token_transfer]
  token_transfer:
    networks:
      ethereum:
        chain_id: 1
        rpc_endpoints:
          - https://eth.example.com
          - https://eth-fallback.example.com
    polling_interval_secs: 12
    max_blocks_per_scan: 50
    start_block:
      ethereum: 19000000
    include_native_transfers: true
    include_erc20_transfers: false
    state_dir: /tmp/sentinel/state

strategies:
  enabled: [token_movement]
  token_movement:
    chain_id: 1
    detectors:
      significant_transfer:
        default_threshold: 1.0

executors:
  enabled: [log, webhook]
  webhook:
    endpoint: https://alerts.example.com/hook
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.queues.group_name, "mainnet");
        assert_eq!(config.queues.stats_interval_secs, 30);
        assert_eq!(config.collectors.enabled, vec!["token_transfer"]);

        let collector = config.collectors.token_transfer.unwrap();
        assert_eq!(collector.networks["ethereum"].chain_id, 1);
        assert_eq!(collector.networks["ethereum"].rpc_endpoints.len(), 2);
        assert_eq!(collector.polling_interval_secs, 12);
        assert!(!collector.include_erc20_transfers);
        // Provider settings default when omitted.
        assert_eq!(collector.provider.max_retries, 3);

        let strategy = config.strategies.token_movement.unwrap();
        assert_eq!(strategy.detectors.significant_transfer.default_threshold, 1.0);

        assert_eq!(config.executors.enabled, vec!["log", "webhook"]);
        assert_eq!(config.executors.webhook.unwrap().endpoint, "https://alerts.example.com/hook");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.queues.group_name, "sentinel");
        assert!(config.collectors.enabled.is_empty());
        assert!(config.strategies.token_movement.is_none());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = Config::load(Path::new("/definitely/not/here.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
