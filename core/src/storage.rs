//! Durable key-value state persisted across restarts: per-collector block
//! cursors, collector stats documents and debugging checkpoints.
//!
//! Backed by a single SQLite database in the configured state directory.
//! Every write is committed before the call returns.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored value for {key} is not valid: {reason}")]
    CorruptValue { key: String, reason: String },

    #[error("storage task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Clone)]
pub struct StateStore {
    db_path: PathBuf,
}

impl StateStore {
    /// Open (or create) the state database under `state_dir`.
    pub async fn open(state_dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(state_dir)?;
        let db_path = state_dir.join("state.db");

        let store = Self { db_path };
        store
            .run_blocking(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS kv (
                         key TEXT PRIMARY KEY,
                         value TEXT NOT NULL
                     );",
                )?;
                Ok(())
            })
            .await?;

        info!("Initialized blockchain state store at {}", store.db_path.display());
        Ok(store)
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::TaskFailed(e.to_string()))?
        .map_err(StorageError::Sqlite)
    }

    async fn get(&self, key: String) -> Result<Option<String>, StorageError> {
        self.run_blocking(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", [&key], |row| row.get(0))
                .optional()
        })
        .await
    }

    async fn put(&self, key: String, value: String) -> Result<(), StorageError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [&key, &value],
            )?;
            Ok(())
        })
        .await
    }

    /// Last fully processed block for a `<component>:<network>` key.
    pub async fn get_last_processed_block(&self, key: &str) -> Result<Option<u64>, StorageError> {
        let storage_key = format!("last_block:{key}");
        match self.get(storage_key.clone()).await? {
            Some(raw) => raw
                .parse::<u64>()
                .map(Some)
                .map_err(|e| StorageError::CorruptValue { key: storage_key, reason: e.to_string() }),
            None => Ok(None),
        }
    }

    pub async fn set_last_processed_block(
        &self,
        key: &str,
        block_number: u64,
    ) -> Result<(), StorageError> {
        self.put(format!("last_block:{key}"), block_number.to_string()).await
    }

    pub async fn store_collector_stats(
        &self,
        collector_id: &str,
        stats: &Value,
    ) -> Result<(), StorageError> {
        self.put(format!("stats:{collector_id}"), stats.to_string()).await
    }

    pub async fn get_collector_stats(
        &self,
        collector_id: &str,
    ) -> Result<Option<Value>, StorageError> {
        let storage_key = format!("stats:{collector_id}");
        match self.get(storage_key.clone()).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::CorruptValue { key: storage_key, reason: e.to_string() }),
            None => Ok(None),
        }
    }

    /// Rewind the cursor for a network after a reorg. Only moves backwards;
    /// a confirmed block at or ahead of the cursor is a no-op.
    pub async fn handle_block_reorg(
        &self,
        network: &str,
        confirmed_block: u64,
    ) -> Result<(), StorageError> {
        let current = self.get_last_processed_block(network).await?.unwrap_or(0);
        if confirmed_block < current {
            warn!(
                "Block reorg detected on {network}. Rewinding from {current} to {confirmed_block}"
            );
            self.set_last_processed_block(network, confirmed_block).await?;
        }
        Ok(())
    }

    /// Auxiliary marker for offline debugging; not required for correctness.
    pub async fn create_checkpoint(
        &self,
        network: &str,
        block: u64,
        timestamp: &str,
    ) -> Result<(), StorageError> {
        self.put(format!("checkpoint:{network}:{timestamp}"), block.to_string()).await
    }

    pub fn close(&self) {
        // Connections are opened per operation, so there is no handle to
        // release here beyond logging the shutdown.
        info!("Blockchain state store closed");
    }
}
