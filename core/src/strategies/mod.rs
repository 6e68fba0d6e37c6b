//! Strategies consume events from the event queue and produce actions for
//! the executor queue.

pub mod token_movement;

use async_trait::async_trait;

use crate::types::{Action, Event};

#[derive(thiserror::Error, Debug)]
pub enum StrategyError {
    #[error("strategy processing error: {0}")]
    Processing(String),
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Process one event and return the actions it produced. A strategy
    /// failure never interrupts the other strategies.
    async fn process_event(&mut self, event: &Event) -> Result<Vec<Action>, StrategyError>;
}

pub use token_movement::TokenMovementStrategy;
