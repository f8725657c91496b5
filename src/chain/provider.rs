//! UTXO / Fee / Broadcast Provider Interface
//!
//! The redemption pipeline only talks to the chain through this trait.
//! Implementations:
//! - `EsploraClient` - Esplora HTTP API
//! - test fixtures and `MockChainProvider` (unit tests)

use async_trait::async_trait;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

/// A spendable output at an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
}

/// Provider errors
///
/// All of these may be retried by the caller; the core never retries.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("broadcast rejected: {0}")]
    Broadcast(String),
}

/// Chain data source for redemptions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Current fee rate in sat/vbyte
    async fn fee_rate(&self) -> Result<u64, ProviderError>;

    /// Spendable outputs at `address`
    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError>;

    /// Hex-encoded raw transaction
    async fn raw_transaction(&self, txid: &Txid) -> Result<String, ProviderError>;

    /// Submit a raw transaction and return its id
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<Txid, ProviderError>;
}
