//! The simplest executor: actions go to the log.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{Executor, ExecutorError};
use crate::types::Action;

pub const COMPONENT_NAME: &str = "log";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogExecutorConfig {}

#[derive(Debug, Default)]
pub struct LogExecutor;

impl LogExecutor {
    pub fn new(_config: LogExecutorConfig) -> Self {
        Self
    }
}

#[async_trait]
impl Executor for LogExecutor {
    fn name(&self) -> &'static str {
        COMPONENT_NAME
    }

    async fn execute(&self, action: &Action) -> Result<(), ExecutorError> {
        match serde_json::to_string(action.data()) {
            Ok(payload) => info!("Action [{}]: {payload}", action.kind),
            Err(_) => info!("Action [{}]: <unserializable payload>", action.kind),
        }
        Ok(())
    }
}
