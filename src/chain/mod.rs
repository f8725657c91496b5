//! Bitcoin Chain Access Module
//!
//! - `provider`: the narrow UTXO / fee / broadcast interface
//! - `esplora`: Esplora HTTP implementation of the provider
//! - `signer`: ECDSA signing capability behind a trait

pub mod esplora;
pub mod provider;
pub mod signer;

// Re-exports for convenience
pub use esplora::{EsploraClient, EsploraError, MAINNET_URL, SIGNET_URL, TESTNET_URL};
pub use provider::{ChainProvider, ProviderError, Utxo};
pub use signer::{Signer, SignerError, SingleKeySigner};

#[cfg(test)]
pub use provider::MockChainProvider;
