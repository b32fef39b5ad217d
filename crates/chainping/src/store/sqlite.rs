use std::path::Path;

use async_trait::async_trait;
use deadpool::managed::{Object, Pool, PoolConfig};
use libsql::params;
use tokio::sync::broadcast;

use super::migrations::run_migrations;
use super::pool::{LibsqlManager, LibsqlPool};
use super::{CHANGE_CHANNEL_CAPACITY, KeyValueStore, StoreChange, StoreError, publish};

/// libsql-backed store keeping one row per key
pub struct SqliteStore {
    pool: LibsqlPool,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_string_lossy().to_string();
        let database = libsql::Builder::new_local(&path).build().await?;

        let pool: LibsqlPool = Pool::builder(LibsqlManager::new(database))
            .config(PoolConfig::default())
            .build()
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        let conn = pool.get().await?;
        run_migrations(&conn).await?;
        drop(conn);

        tracing::info!(path = %path, "Opened SQLite store");

        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self { pool, changes })
    }

    async fn get_conn(&self) -> Result<Object<LibsqlManager>, StoreError> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query("SELECT value FROM kv_entries WHERE key = ?1", params![key.to_string()])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row.get::<String>(0)?))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.get_conn().await?;
        let updated_at = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key.to_string(), value.to_string(), updated_at],
        )
        .await?;

        publish(&self.changes, key, value);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
