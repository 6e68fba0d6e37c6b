// public
pub mod chains;
pub mod collectors;
pub mod config;
pub mod erc20;
pub mod executors;
pub mod pipeline;
pub mod provider;
pub mod queue;
pub mod storage;
pub mod strategies;
pub mod types;

mod logger;
pub use logger::{mark_shutdown_started, setup_info_logger, setup_logger};

pub use config::{Config, ConfigError};
pub use pipeline::{BuildError, PipelineError, Sentinel, SentinelBuilder};
pub use provider::{MultiNodeProvider, ProviderError, ProviderSettings};
pub use queue::{DurableQueue, QueueError};
pub use storage::{StateStore, StorageError};
pub use types::{Action, Alert, Event, Severity, TokenTransferEvent, Web3LogEvent};
