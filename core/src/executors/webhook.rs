//! Webhook executor: POSTs each action as JSON to a configured endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{Executor, ExecutorError};
use crate::types::Action;

pub const COMPONENT_NAME: &str = "webhook";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookExecutorConfig {
    pub endpoint: String,
    /// Value for the `x-sentinel-id` header, identifying this pipeline.
    #[serde(default = "default_source_id")]
    pub source_id: String,
}

fn default_source_id() -> String {
    "sentinel".to_string()
}

#[derive(Debug)]
pub struct WebhookExecutor {
    client: Client,
    config: WebhookExecutorConfig,
}

impl WebhookExecutor {
    pub fn new(config: WebhookExecutorConfig) -> Result<Self, ExecutorError> {
        if config.endpoint.is_empty() {
            return Err(ExecutorError::Config("webhook endpoint must not be empty".to_string()));
        }
        Ok(Self { client: Client::new(), config })
    }
}

#[async_trait]
impl Executor for WebhookExecutor {
    fn name(&self) -> &'static str {
        COMPONENT_NAME
    }

    async fn execute(&self, action: &Action) -> Result<(), ExecutorError> {
        let message = json!({
            "kind": action.kind,
            "data": action.data(),
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .header("x-sentinel-id", &self.config.source_id)
            .json(&message)
            .send()
            .await
            .map_err(|e| ExecutorError::Delivery(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ExecutorError::Delivery(format!(
                "failed to send webhook: {}",
                response.status()
            )))
        }
    }
}
