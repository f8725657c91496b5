//! Redemption of CLTV-locked outputs
//!
//! # Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    REDEMPTION FLOW                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  1. Look up the registered script for `from`                   │
//! │                                                                 │
//! │  2. Builder: mode/network detection, UTXOs + fee rate,          │
//! │     parent txs (legacy only), coin selection, unsigned PSBT    │
//! │     └── nLockTime = script lock time, sequence 0xfffffffe      │
//! │                                                                 │
//! │  3. Finalizer: sign every input, validate every signature,      │
//! │     assemble scriptSig / witness, serialize                     │
//! │                                                                 │
//! │  4. Broadcast via the chain provider                            │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let service = LockedOutputService::new(store, provider, signer, network, test_network, account);
//! service.register(address, script_hex, None).await?;
//! let receipt = service.spend(address, destination, SpendAmount::Sweep, None).await?;
//! ```

pub mod builder;
pub mod coin_select;
pub mod finalizer;
pub mod service;

pub use builder::{BuilderError, RedemptionBuilder, UnsignedRedemption};
pub use coin_select::{
    estimate_fee, select, InputProfile, Selection, SelectionError, SelectionParams, DUST_LIMIT,
};
pub use finalizer::{
    assemble_unlock_stack, sign_and_finalize, FinalizeError, FinalizedRedemption, PartialSignature,
};
pub use service::{LockedOutputService, ServiceError};
