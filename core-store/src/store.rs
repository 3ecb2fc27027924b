//! Serialized local-store access layer.
//!
//! Every statement against the cache goes through one [`Store`]. Callers
//! are serialized through a single coarse mutex: the cache is one file and
//! contention is rare, but an interleaved read-modify-write must never be
//! possible. A transient "database is locked" error is retried a bounded
//! number of times with a fixed delay before it propagates. Each statement
//! commits on its own; multi-statement atomicity is composed by callers
//! where they need it.

use crate::error::{Result, StoreError};
use crate::value::{decode_row, SqlRow, SqlValue};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Retry policy for transient lock contention.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Attempts before a busy error propagates.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// The single entry point for statements against the local cache.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
    config: StoreConfig,
    lock: Arc<Mutex<()>>,
}

impl Store {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self::with_config(pool, StoreConfig::default())
    }

    pub fn with_config(pool: Pool<Sqlite>, config: StoreConfig) -> Self {
        Self {
            pool,
            config,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The underlying pool, for typed queries outside the dynamic layer.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Execute one write statement, returning the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let _guard = self.lock.lock().await;
        self.retry(|| async move {
            let args = Self::bind_args(params)?;
            let result = sqlx::query_with(sql, args).execute(&self.pool).await?;
            Ok(result.rows_affected())
        })
        .await
    }

    /// Execute one write statement and return the last inserted rowid.
    pub async fn insert(&self, sql: &str, params: &[SqlValue]) -> Result<i64> {
        let _guard = self.lock.lock().await;
        self.retry(|| async move {
            let args = Self::bind_args(params)?;
            let result = sqlx::query_with(sql, args).execute(&self.pool).await?;
            Ok(result.last_insert_rowid())
        })
        .await
    }

    /// Run one query and decode all rows by column name.
    pub async fn fetch(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let _guard = self.lock.lock().await;
        self.retry(|| async move {
            let args = Self::bind_args(params)?;
            let rows = sqlx::query_with(sql, args).fetch_all(&self.pool).await?;
            rows.iter()
                .map(|row| decode_row(row).map_err(StoreError::Database))
                .collect()
        })
        .await
    }

    /// Run one query and decode the first row, if any.
    pub async fn fetch_optional(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlRow>> {
        let _guard = self.lock.lock().await;
        self.retry(|| async move {
            let args = Self::bind_args(params)?;
            let row = sqlx::query_with(sql, args).fetch_optional(&self.pool).await?;
            row.map(|r| decode_row(&r).map_err(StoreError::Database))
                .transpose()
        })
        .await
    }

    fn bind_args(params: &[SqlValue]) -> Result<SqliteArguments<'static>> {
        let mut args = SqliteArguments::default();
        for value in params {
            value.add_to(&mut args).map_err(StoreError::Database)?;
        }
        Ok(args)
    }

    async fn retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) && attempt < self.config.max_retries => {
                    debug!(attempt, "Database is locked, delaying");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) if is_busy(&e) => {
                    return Err(StoreError::Busy { attempts: attempt });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_busy(error: &StoreError) -> bool {
    match error {
        StoreError::Database(sqlx::Error::Database(db)) => {
            let msg = db.message().to_lowercase();
            msg.contains("locked") || msg.contains("busy")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn execute_and_fetch_roundtrip() {
        let store = Store::new(create_test_pool().await.unwrap());

        store
            .execute(
                "INSERT INTO projects (account_id, remote_id, name) VALUES (?, ?, ?)",
                &[SqlValue::Integer(1), SqlValue::Integer(100), "Website".into()],
            )
            .await
            .unwrap();

        let rows = store
            .fetch(
                "SELECT name, remote_id FROM projects WHERE account_id = ?",
                &[SqlValue::Integer(1)],
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], SqlValue::Text("Website".to_string()));
        assert_eq!(rows[0]["remote_id"], SqlValue::Integer(100));
    }

    #[tokio::test]
    async fn fetch_decodes_nulls() {
        let store = Store::new(create_test_pool().await.unwrap());
        store
            .execute(
                "INSERT INTO projects (account_id, name) VALUES (?, ?)",
                &[SqlValue::Integer(1), "No remote yet".into()],
            )
            .await
            .unwrap();

        let row = store
            .fetch_optional("SELECT remote_id FROM projects LIMIT 1", &[])
            .await
            .unwrap()
            .unwrap();
        assert!(row["remote_id"].is_null());
    }

    #[tokio::test]
    async fn insert_returns_rowid() {
        let store = Store::new(create_test_pool().await.unwrap());
        let first = store
            .insert(
                "INSERT INTO projects (account_id, name) VALUES (?, ?)",
                &[SqlValue::Integer(1), "A".into()],
            )
            .await
            .unwrap();
        let second = store
            .insert(
                "INSERT INTO projects (account_id, name) VALUES (?, ?)",
                &[SqlValue::Integer(1), "B".into()],
            )
            .await
            .unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn fetch_optional_returns_first_match() {
        let store = Store::new(create_test_pool().await.unwrap());
        for name in ["A", "B"] {
            store
                .execute(
                    "INSERT INTO projects (account_id, name) VALUES (?, ?)",
                    &[SqlValue::Integer(1), (*name).into()],
                )
                .await
                .unwrap();
        }

        let row = store
            .fetch_optional(
                "SELECT name FROM projects WHERE account_id = ? ORDER BY id",
                &[SqlValue::Integer(1)],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], SqlValue::Text("A".to_string()));
    }

    #[tokio::test]
    async fn lock_contention_retries_then_errors() {
        let path = std::env::temp_dir().join(format!("record-sync-busy-{}.db", std::process::id()));
        let pool = crate::db::create_pool(
            crate::db::DatabaseConfig::new(&path)
                .max_connections(2)
                .acquire_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        // Park a write transaction on one connection so the store's write
        // hits SQLITE_BUSY on the other.
        let mut blocker = pool.acquire().await.unwrap();
        sqlx::query("BEGIN EXCLUSIVE")
            .execute(blocker.as_mut())
            .await
            .unwrap();

        let store = Store::with_config(
            pool.clone(),
            StoreConfig {
                max_retries: 2,
                retry_delay: Duration::from_millis(10),
            },
        );
        let err = store
            .execute("INSERT INTO projects (account_id, name) VALUES (1, 'blocked')", &[])
            .await;
        assert!(matches!(err, Err(StoreError::Busy { attempts: 2 })));

        sqlx::query("ROLLBACK").execute(blocker.as_mut()).await.unwrap();
        drop(blocker);
        pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(path.with_extension(format!("db{suffix}")));
        }
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn non_busy_errors_propagate_without_retry() {
        let store = Store::new(create_test_pool().await.unwrap());
        let err = store.execute("INSERT INTO no_such_table VALUES (1)", &[]).await;
        assert!(matches!(err, Err(StoreError::Database(_))));
    }
}
