use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;
use serde_json::Value;

use crate::errors::StorageError;
use crate::storage::area::{StorageArea, StorageDriver};
use crate::storage::types::StoreConfig;

/// SQLite-backed storage driver. All instances live in one `kv_store` table,
/// namespaced by `(name, store_name)`.
#[derive(Clone)]
pub struct SqliteDriver {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteDriver {
    pub const NAME: &'static str = "sqlite";

    /// Opens (or creates) the database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_WRITE |
                    OpenFlags::SQLITE_OPEN_CREATE |
                    OpenFlags::SQLITE_OPEN_URI
            )
            .with_init(|c| {
                c.busy_timeout(std::time::Duration::from_millis(500))?;
                c.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
                c.execute_batch(
                    "CREATE TABLE IF NOT EXISTS kv_store (
                        name TEXT NOT NULL,
                        store_name TEXT NOT NULL,
                        key TEXT NOT NULL,
                        value TEXT NOT NULL,
                        updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now')),
                        PRIMARY KEY(name, store_name, key)
                    );"
                )?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(16)
            .connection_timeout(std::time::Duration::from_secs(5))
            .build(manager)
            .map_err(|e| StorageError::NoStorageAvailable(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl StorageDriver for SqliteDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn open(&self, config: &StoreConfig) -> Result<Arc<dyn StorageArea>> {
        config.validate()?;
        Ok(Arc::new(SqliteArea {
            pool: self.pool.clone(),
            name: config.name.clone(),
            store_name: config.store_name_or_default().to_string(),
            config: config.clone(),
        }))
    }
}

struct SqliteArea {
    pool: Pool<SqliteConnectionManager>,
    name: String,
    store_name: String,
    config: StoreConfig,
}

impl SqliteArea {
    /// Runs `f` on a pooled connection off the async executor.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str, &str) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let name = self.name.clone();
        let store_name = self.store_name.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| StorageError::NoStorageAvailable(e.to_string()))?;
            f(&conn, &name, &store_name)
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }
}

fn backend(e: r2d2_sqlite::rusqlite::Error) -> anyhow::Error {
    StorageError::Backend(e.to_string()).into()
}

#[async_trait]
impl StorageArea for SqliteArea {
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.with_conn(move |conn, name, store_name| {
            let raw = conn
                .query_row(
                    "SELECT value FROM kv_store WHERE name=?1 AND store_name=?2 AND key=?3",
                    params![name, store_name, key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(backend)?;

            raw.map(|raw| {
                serde_json::from_str::<Value>(&raw)
                    .map_err(|source| anyhow::Error::from(StorageError::Malformed { key: key.clone(), source }))
            })
            .transpose()
        })
        .await
    }

    async fn set(&self, key: &str, value: Value) -> Result<Value> {
        let key = key.to_string();
        let raw = value.to_string();
        self.with_conn(move |conn, name, store_name| {
            conn.execute(
                "INSERT INTO kv_store(name, store_name, key, value) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name, store_name, key) DO UPDATE
                 SET value=excluded.value, updated_at=strftime('%s','now')",
                params![name, store_name, key, raw],
            )
            .map_err(backend)?;
            Ok(())
        })
        .await?;
        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn, name, store_name| {
            conn.execute(
                "DELETE FROM kv_store WHERE name=?1 AND store_name=?2 AND key=?3",
                params![name, store_name, key],
            )
            .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.with_conn(|conn, name, store_name| {
            conn.execute(
                "DELETE FROM kv_store WHERE name=?1 AND store_name=?2",
                params![name, store_name],
            )
            .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.with_conn(|conn, name, store_name| {
            let mut stmt = conn
                .prepare("SELECT key FROM kv_store WHERE name=?1 AND store_name=?2 ORDER BY rowid")
                .map_err(backend)?;
            let rows = stmt
                .query_map(params![name, store_name], |row| row.get::<_, String>(0))
                .map_err(backend)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(backend)
        })
        .await
    }

    async fn len(&self) -> Result<usize> {
        self.with_conn(|conn, name, store_name| {
            let count = conn
                .query_row(
                    "SELECT COUNT(*) FROM kv_store WHERE name=?1 AND store_name=?2",
                    params![name, store_name],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(backend)?;
            Ok(count as usize)
        })
        .await
    }

    async fn drop_instance(&self, options: Option<&StoreConfig>) -> Result<()> {
        let target = options.unwrap_or(&self.config).clone();
        target.validate()?;

        self.with_conn(move |conn, _, _| {
            let deleted = match target.nested_store_name() {
                Some(store_name) => conn.execute(
                    "DELETE FROM kv_store WHERE name=?1 AND store_name=?2",
                    params![target.name, store_name],
                ),
                None => conn.execute("DELETE FROM kv_store WHERE name=?1", params![target.name]),
            };
            deleted.map_err(backend)?;
            Ok(())
        })
        .await
    }
}
