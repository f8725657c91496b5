//! Shared Types Module
//!
//! Data types shared across the wallet core.

pub mod locked;
pub mod redemption;

// Re-exports for convenience
pub use locked::{AccountMap, LockedOutput, LockedOutputMap};
pub use redemption::{RedemptionRequest, SpendAmount, SpendReceipt};
