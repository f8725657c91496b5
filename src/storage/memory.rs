//! In-Memory Storage Implementation
//!
//! Provides in-memory storage for testing and development.
//! Data is lost when the service restarts.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{LockedOutputStore, StorageResult};
use crate::types::locked::{AccountMap, LockedOutput, LockedOutputMap};

/// In-memory locked output store
///
/// Thread-safe; uses Arc<RwLock<>> for concurrent access.
#[derive(Clone, Default)]
pub struct MemoryLockedOutputStore {
    accounts: Arc<RwLock<AccountMap>>,
}

impl MemoryLockedOutputStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `accounts`
    pub fn from_accounts(accounts: AccountMap) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(accounts)),
        }
    }
}

#[async_trait]
impl LockedOutputStore for MemoryLockedOutputStore {
    async fn get(&self, account: &str) -> StorageResult<LockedOutputMap> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(account).cloned().unwrap_or_default())
    }

    async fn exists(&self, account: &str) -> StorageResult<bool> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(account).is_some_and(|outputs| !outputs.is_empty()))
    }

    async fn get_all(&self) -> StorageResult<AccountMap> {
        Ok(self.accounts.read().await.clone())
    }

    async fn add(
        &self,
        address: &str,
        script: &str,
        account: &str,
        lock_time: u32,
    ) -> StorageResult<()> {
        let mut accounts = self.accounts.write().await;
        accounts
            .entry(account.to_string())
            .or_default()
            .insert(address.to_string(), LockedOutput::new(script, lock_time));
        Ok(())
    }

    async fn remove(&self, address: &str) -> StorageResult<bool> {
        let mut accounts = self.accounts.write().await;

        let mut removed = false;
        for outputs in accounts.values_mut() {
            removed |= outputs.remove(address).is_some();
        }
        accounts.retain(|_, outputs| !outputs.is_empty());

        Ok(removed)
    }
}
