//! CLTV Wallet - Locked Output Core
//!
//! Registers bitcoin outputs locked by CHECKLOCKTIMEVERIFY redeem scripts
//! and spends them once the lock has passed.
//!
//! ## Components
//!
//! 1. **Script codec** - disassembles and classifies the four CLTV templates
//! 2. **Address verifier** - checks a P2SH/P2WSH address commits to a script
//! 3. **Redemption builder** - UTXOs, coin selection, unsigned PSBT
//! 4. **Signer & finalizer** - signs, validates, assembles unlock data
//! 5. **Locked output service** - register / list / spend over a store
//!
//! ## Surfaces
//!
//! - JSON-RPC over HTTP (`api`)
//! - `cltv-wallet` and `cltv` binaries

pub mod api;
pub mod chain;
pub mod common;
pub mod redemption;
pub mod script;
pub mod storage;
pub mod types;

// Re-exports: chain access
pub use chain::{ChainProvider, EsploraClient, ProviderError, Signer, SignerError, SingleKeySigner, Utxo};

// Re-exports: configuration and errors
pub use common::{WalletConfig, WalletError, DEFAULT_ACCOUNT};

// Re-exports: scripts
pub use script::{parse, verify, RedeemScript, RedeemScriptKind, ScriptDecodeError, ScriptMode};

// Re-exports: redemption
pub use redemption::{
    sign_and_finalize, FinalizedRedemption, LockedOutputService, RedemptionBuilder, ServiceError,
    UnsignedRedemption,
};

// Re-exports: storage and shared types
pub use storage::{LockedOutputStore, MemoryLockedOutputStore, SqliteLockedOutputStore};
pub use types::{LockedOutput, LockedOutputMap, RedemptionRequest, SpendAmount, SpendReceipt};
