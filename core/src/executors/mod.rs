//! Executors deliver actions to the outside world. Every registered
//! executor sees every action; failures are isolated per executor.

pub mod log;
pub mod webhook;

use async_trait::async_trait;

use crate::types::Action;

#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    #[error("executor configuration error: {0}")]
    Config(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, action: &Action) -> Result<(), ExecutorError>;
}

pub use log::LogExecutor;
pub use webhook::WebhookExecutor;
