//! Durable FIFO queues connecting pipeline stages.
//!
//! Items are persisted on enqueue and removed on dequeue, so anything
//! sitting in a queue when the process dies is delivered after restart.
//! Multi-producer, single-consumer; the consumer waits with a timeout and a
//! timeout is not an error.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use rusqlite::{Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::info;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("queue payload could not be decoded: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("queue task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug)]
pub struct DurableQueue<T> {
    db_path: PathBuf,
    notify: Arc<Notify>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> DurableQueue<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Open (or create) a queue database at `path`.
    pub async fn open(path: &Path) -> Result<Self, QueueError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let queue = Self {
            db_path: path.to_path_buf(),
            notify: Arc::new(Notify::new()),
            _payload: PhantomData,
        };
        queue
            .run_blocking(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS items (
                         id INTEGER PRIMARY KEY AUTOINCREMENT,
                         payload TEXT NOT NULL
                     );",
                )?;
                Ok(())
            })
            .await?;

        info!("Opened durable queue at {}", queue.db_path.display());
        Ok(queue)
    }

    async fn run_blocking<R, F>(&self, f: F) -> Result<R, QueueError>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            f(&conn)
        })
        .await
        .map_err(|e| QueueError::TaskFailed(e.to_string()))?
        .map_err(QueueError::Sqlite)
    }

    /// Persist an item at the queue tail. The item is visible to the
    /// consumer only once the write has committed.
    pub async fn enqueue(&self, item: &T) -> Result<(), QueueError> {
        let payload = serde_json::to_string(item)?;
        self.run_blocking(move |conn| {
            conn.execute("INSERT INTO items (payload) VALUES (?1)", [&payload])?;
            Ok(())
        })
        .await?;
        self.notify.notify_one();
        Ok(())
    }

    async fn try_dequeue(&self) -> Result<Option<T>, QueueError> {
        let row: Option<String> = self
            .run_blocking(|conn| {
                let tx = conn.unchecked_transaction()?;
                let head: Option<(i64, String)> = tx
                    .query_row(
                        "SELECT id, payload FROM items ORDER BY id LIMIT 1",
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let payload = match head {
                    Some((id, payload)) => {
                        tx.execute("DELETE FROM items WHERE id = ?1", [id])?;
                        Some(payload)
                    }
                    None => None,
                };
                tx.commit()?;
                Ok(payload)
            })
            .await?;

        match row {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Remove and return the head item, waiting up to `timeout` for one to
    /// arrive. `Ok(None)` on timeout - an empty queue is normal idleness.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<T>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(item) = self.try_dequeue().await? {
                return Ok(Some(item));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified()).await.is_err() {
                return Ok(None);
            }
        }
    }

    /// Current queue depth.
    pub async fn len(&self) -> Result<u64, QueueError> {
        self.run_blocking(|conn| {
            conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get::<_, i64>(0))
        })
        .await
        .map(|count| count as u64)
    }

    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    pub fn close(&self) {
        // Per-operation connections leave nothing to release; pending items
        // stay durable for the next start.
        info!("Closed durable queue at {}", self.db_path.display());
    }
}
