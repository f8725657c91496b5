//! Locked Output Types
//!
//! Persisted shape of a registered locked output. Serialized as
//! `{account: {address: {"script": hex, "lockTime": n}}}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A registered CLTV-locked output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedOutput {
    /// Hex-encoded redeem script
    pub script: String,
    /// Lock time pushed by the script (block height or unix timestamp)
    #[serde(rename = "lockTime")]
    pub lock_time: u32,
}

impl LockedOutput {
    pub fn new(script: impl Into<String>, lock_time: u32) -> Self {
        Self {
            script: script.into(),
            lock_time,
        }
    }

    /// Decoded redeem script bytes
    pub fn script_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.script)
    }
}

/// Locked outputs of one account, keyed by locked address
pub type LockedOutputMap = BTreeMap<String, LockedOutput>;

/// All accounts, keyed by account address
pub type AccountMap = BTreeMap<String, LockedOutputMap>;
