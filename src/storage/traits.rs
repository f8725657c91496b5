//! Storage Trait Definitions
//!
//! Defines the locked-output store interface.
//! Implementations can use SQLite (production) or in-memory (testing).

use async_trait::async_trait;
use thiserror::Error;

use crate::types::locked::{AccountMap, LockedOutputMap};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Locked output storage interface
///
/// Outputs are keyed by account address, then by locked address.
///
/// Implementations:
/// - `SqliteLockedOutputStore` - Production storage with SQLite
/// - `MemoryLockedOutputStore` - In-memory storage for testing
#[async_trait]
pub trait LockedOutputStore: Send + Sync {
    /// Locked outputs registered under `account` (empty when unknown)
    async fn get(&self, account: &str) -> StorageResult<LockedOutputMap>;

    /// Whether `account` has at least one locked output
    async fn exists(&self, account: &str) -> StorageResult<bool>;

    /// Every account and its locked outputs
    async fn get_all(&self) -> StorageResult<AccountMap>;

    /// Register a locked output, overwriting any previous entry for the
    /// same account and address
    async fn add(
        &self,
        address: &str,
        script: &str,
        account: &str,
        lock_time: u32,
    ) -> StorageResult<()>;

    /// Remove `address` from every account. Returns whether anything was removed.
    async fn remove(&self, address: &str) -> StorageResult<bool>;
}
