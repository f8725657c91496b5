//! SQLite Persistent Storage for Locked Outputs
//!
//! Provides durable storage for registered locked outputs that survives
//! service restarts. Uses connection pooling via r2d2 for concurrent access.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use super::traits::{LockedOutputStore, StorageError, StorageResult};
use crate::types::locked::{AccountMap, LockedOutput, LockedOutputMap};

/// SQLite-backed locked output store with connection pooling
pub struct SqliteLockedOutputStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteLockedOutputStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS locked_outputs (
                account TEXT NOT NULL,
                address TEXT NOT NULL,
                script TEXT NOT NULL,
                lock_time INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (account, address)
            );

            CREATE INDEX IF NOT EXISTS idx_locked_outputs_address ON locked_outputs(address);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<(String, String, LockedOutput)> {
        let lock_time: i64 = row.get("lock_time")?;
        Ok((
            row.get("account")?,
            row.get("address")?,
            LockedOutput {
                script: row.get("script")?,
                lock_time: lock_time as u32,
            },
        ))
    }

    // Synchronous helper methods for the trait implementations

    fn get_sync(&self, account: &str) -> Result<LockedOutputMap, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT account, address, script, lock_time FROM locked_outputs WHERE account = ?1",
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![account], Self::row_to_entry)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut outputs = LockedOutputMap::new();
        for row in rows {
            let (_, address, output) = row.map_err(|e| StorageError::Database(e.to_string()))?;
            outputs.insert(address, output);
        }

        Ok(outputs)
    }

    fn exists_sync(&self, account: &str) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM locked_outputs WHERE account = ?1",
                params![account],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    fn get_all_sync(&self) -> Result<AccountMap, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare("SELECT account, address, script, lock_time FROM locked_outputs")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_entry)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut accounts = AccountMap::new();
        for row in rows {
            let (account, address, output) =
                row.map_err(|e| StorageError::Database(e.to_string()))?;
            accounts.entry(account).or_default().insert(address, output);
        }

        Ok(accounts)
    }

    fn add_sync(
        &self,
        address: &str,
        script: &str,
        account: &str,
        lock_time: u32,
    ) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO locked_outputs (account, address, script, lock_time, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (account, address) DO UPDATE SET
                script = excluded.script,
                lock_time = excluded.lock_time,
                updated_at = excluded.updated_at
            "#,
            params![
                account,
                address,
                script,
                lock_time as i64,
                chrono::Utc::now().timestamp(),
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn remove_sync(&self, address: &str) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute("DELETE FROM locked_outputs WHERE address = ?1", params![address])
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows_affected > 0)
    }
}

#[async_trait]
impl LockedOutputStore for SqliteLockedOutputStore {
    async fn get(&self, account: &str) -> StorageResult<LockedOutputMap> {
        self.get_sync(account)
    }

    async fn exists(&self, account: &str) -> StorageResult<bool> {
        self.exists_sync(account)
    }

    async fn get_all(&self) -> StorageResult<AccountMap> {
        self.get_all_sync()
    }

    async fn add(
        &self,
        address: &str,
        script: &str,
        account: &str,
        lock_time: u32,
    ) -> StorageResult<()> {
        self.add_sync(address, script, account, lock_time)
    }

    async fn remove(&self, address: &str) -> StorageResult<bool> {
        self.remove_sync(address)
    }
}
