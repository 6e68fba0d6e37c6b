//! Event producers. A collector polls one or more chains, yields typed
//! events through a channel-backed stream and owns its resume cursors.

pub mod token_transfer;
pub mod web3_event;

use async_trait::async_trait;
use tokio_stream::wrappers::ReceiverStream;

use crate::{provider::ProviderError, storage::StorageError, types::Event};

#[derive(thiserror::Error, Debug)]
pub enum CollectorError {
    #[error("collector configuration error: {0}")]
    Config(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Initialize cursors and open state; idempotent.
    async fn start(&self) -> Result<(), CollectorError>;

    /// Stop polling and release the state store handle.
    async fn stop(&self) -> Result<(), CollectorError>;

    /// A lazy, unbounded stream of events. The stream ends when the
    /// collector is stopped; calling again after a restart yields a fresh
    /// stream.
    fn events(&self) -> ReceiverStream<Event>;
}

pub use token_transfer::TokenTransferCollector;
pub use web3_event::Web3EventCollector;
