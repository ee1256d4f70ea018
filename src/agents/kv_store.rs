//! Namespaced key-value persistence.
//!
//! Writes are staged in memory by `set` and reach disk only on `save`,
//! which commits every staged entry in one transaction.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio_rusqlite::Connection;
use tracing::debug;

/// Boxed future type for key-value operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised by key-value stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Async `SQLite` wrapper error.
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Stored value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for key-value operations.
pub type StoreResult<T> = Result<T, StoreError>;

type StagedKey = (String, String);

/// Persistent string values grouped by namespace.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, staged writes included.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(&self, namespace: &str, key: &str) -> StoreFuture<'_, StoreResult<Option<String>>>;

    /// Stage a value for the next [`KeyValueStore::save`].
    fn set(&self, namespace: &str, key: &str, value: String);

    /// Commit staged values. Returns how many entries were written.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; staged values are kept.
    fn save(&self) -> StoreFuture<'_, StoreResult<usize>>;
}

/// `SQLite` implementation of the key-value store.
pub struct SqliteKeyValueStore {
    conn: Connection,
    staged: Mutex<BTreeMap<StagedKey, String>>,
}

const TABLE: &str = "kv_entries";

impl SqliteKeyValueStore {
    /// Open (or create) the database file.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::init(conn).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> StoreResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {TABLE} (
                    namespace TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (namespace, key)
                )"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            staged: Mutex::new(BTreeMap::new()),
        })
    }

    fn staged_value(&self, namespace: &str, key: &str) -> Option<String> {
        let staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
        staged
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, namespace: &str, key: &str) -> StoreFuture<'_, StoreResult<Option<String>>> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        Box::pin(async move {
            if let Some(value) = self.staged_value(&namespace, &key) {
                return Ok(Some(value));
            }

            let value = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT value FROM {TABLE} WHERE namespace = ?1 AND key = ?2"
                    ))?;
                    let value: Option<String> = stmt
                        .query_row(rusqlite::params![namespace, key], |row| row.get(0))
                        .ok();
                    Ok(value)
                })
                .await?;
            Ok(value)
        })
    }

    fn set(&self, namespace: &str, key: &str, value: String) {
        let mut staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
        staged.insert((namespace.to_string(), key.to_string()), value);
    }

    fn save(&self) -> StoreFuture<'_, StoreResult<usize>> {
        Box::pin(async move {
            let entries: Vec<(StagedKey, String)> = {
                let staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
                staged.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            };
            if entries.is_empty() {
                return Ok(0);
            }

            let written = entries.clone();
            let count = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    {
                        let mut stmt = tx.prepare(&format!(
                            "INSERT OR REPLACE INTO {TABLE} (namespace, key, value)
                             VALUES (?1, ?2, ?3)"
                        ))?;
                        for ((namespace, key), value) in &written {
                            stmt.execute(rusqlite::params![namespace, key, value])?;
                        }
                    }
                    tx.commit()?;
                    Ok(written.len())
                })
                .await?;

            // Drop only what was committed; later `set` calls stay staged.
            let mut staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
            for (key, value) in entries {
                if staged.get(&key) == Some(&value) {
                    staged.remove(&key);
                }
            }
            debug!(entries = count, "saved key-value entries");
            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_is_visible_before_save() {
        let store = SqliteKeyValueStore::open_in_memory().await.unwrap();
        assert_eq!(store.get("agents", "installed").await.unwrap(), None);
        store.set("agents", "installed", "[\"1\"]".to_string());
        assert_eq!(
            store.get("agents", "installed").await.unwrap().as_deref(),
            Some("[\"1\"]")
        );
    }

    #[tokio::test]
    async fn test_save_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.sqlite");

        {
            let store = SqliteKeyValueStore::open(&path).await.unwrap();
            store.set("agents", "installed", "[\"2\"]".to_string());
            store.set("other", "installed", "x".to_string());
            assert_eq!(store.save().await.unwrap(), 2);
            assert_eq!(store.save().await.unwrap(), 0);
        }

        let reopened = SqliteKeyValueStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("agents", "installed").await.unwrap().as_deref(),
            Some("[\"2\"]")
        );
        assert_eq!(
            reopened.get("other", "installed").await.unwrap().as_deref(),
            Some("x")
        );
        assert_eq!(reopened.get("agents", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsaved_values_are_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.sqlite");
        {
            let store = SqliteKeyValueStore::open(&path).await.unwrap();
            store.set("agents", "installed", "[]".to_string());
        }
        let reopened = SqliteKeyValueStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("agents", "installed").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = SqliteKeyValueStore::open_in_memory().await.unwrap();
        store.set("agents", "installed", "a".to_string());
        store.save().await.unwrap();
        store.set("agents", "installed", "b".to_string());
        store.save().await.unwrap();
        assert_eq!(
            store.get("agents", "installed").await.unwrap().as_deref(),
            Some("b")
        );
    }
}
