//! Builds a [`Sentinel`] pipeline from the configuration tree: every
//! enabled component name is looked up in the registry and constructed
//! from its section.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::Sentinel;
use crate::{
    collectors::{Collector, CollectorError, TokenTransferCollector, Web3EventCollector},
    config::Config,
    executors::{Executor, ExecutorError, LogExecutor, WebhookExecutor},
    strategies::{Strategy, TokenMovementStrategy},
};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("no {kind} registered with name: {name}")]
    UnknownComponent { kind: &'static str, name: String },

    #[error("{kind} {name} is enabled but has no configuration section")]
    MissingSection { kind: &'static str, name: String },

    #[error(transparent)]
    Collector(#[from] CollectorError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

pub struct SentinelBuilder {
    config: Config,
}

impl SentinelBuilder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn build(self) -> Result<Sentinel, BuildError> {
        let queues = &self.config.queues;
        let mut sentinel = Sentinel::new(
            queues.dir.clone(),
            queues.group_name.clone(),
            queues.stats_interval_secs,
        );

        for name in &self.config.collectors.enabled {
            sentinel.add_collector(build_collector(name, &self.config)?);
        }
        for name in &self.config.strategies.enabled {
            sentinel.add_strategy(build_strategy(name, &self.config)?);
        }
        for name in &self.config.executors.enabled {
            sentinel.add_executor(build_executor(name, &self.config)?);
        }

        info!("Pipeline built from configuration");
        Ok(sentinel)
    }
}

fn build_collector(name: &str, config: &Config) -> Result<Arc<dyn Collector>, BuildError> {
    match name {
        "token_transfer" => {
            let section = config.collectors.token_transfer.clone().ok_or_else(|| {
                BuildError::MissingSection { kind: "collector", name: name.to_string() }
            })?;
            Ok(Arc::new(TokenTransferCollector::new(section)?))
        }
        "web3_event" => {
            let section = config.collectors.web3_event.clone().ok_or_else(|| {
                BuildError::MissingSection { kind: "collector", name: name.to_string() }
            })?;
            Ok(Arc::new(Web3EventCollector::new(section)?))
        }
        other => {
            Err(BuildError::UnknownComponent { kind: "collector", name: other.to_string() })
        }
    }
}

fn build_strategy(name: &str, config: &Config) -> Result<Box<dyn Strategy>, BuildError> {
    match name {
        "token_movement" => {
            let section = config.strategies.token_movement.clone().ok_or_else(|| {
                BuildError::MissingSection { kind: "strategy", name: name.to_string() }
            })?;
            Ok(Box::new(TokenMovementStrategy::new(section)))
        }
        other => Err(BuildError::UnknownComponent { kind: "strategy", name: other.to_string() }),
    }
}

fn build_executor(name: &str, config: &Config) -> Result<Arc<dyn Executor>, BuildError> {
    match name {
        "log" => {
            let section = config.executors.log.clone().unwrap_or_default();
            Ok(Arc::new(LogExecutor::new(section)))
        }
        "webhook" => {
            let section = config.executors.webhook.clone().ok_or_else(|| {
                BuildError::MissingSection { kind: "executor", name: name.to_string() }
            })?;
            Ok(Arc::new(WebhookExecutor::new(section)?))
        }
        other => Err(BuildError::UnknownComponent { kind: "executor", name: other.to_string() }),
    }
}
