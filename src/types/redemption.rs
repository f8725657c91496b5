//! Redemption Types
//!
//! Request and receipt types for spending a locked output.

use bitcoin::Txid;
use serde::{Deserialize, Serialize};

/// How much of the locked balance to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendAmount {
    /// Spend every UTXO at the locked address, destination gets total minus fee
    #[default]
    Sweep,
    /// Send exactly this many satoshis, change goes back to the locked address
    Exact(u64),
}

impl SpendAmount {
    pub fn from_option(amount: Option<u64>) -> Self {
        amount.map(Self::Exact).unwrap_or_default()
    }
}

/// A request to spend the outputs locked at `from`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionRequest {
    /// Locked P2SH/P2WSH address
    pub from: String,
    /// Destination address
    pub to: String,
    /// Raw redeem script wrapped by `from`
    pub redeem_script: Vec<u8>,
    pub amount: SpendAmount,
}

impl RedemptionRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>, redeem_script: Vec<u8>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            redeem_script,
            amount: SpendAmount::Sweep,
        }
    }

    pub fn with_amount(mut self, amount: SpendAmount) -> Self {
        self.amount = amount;
        self
    }
}

/// Result of a broadcast redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendReceipt {
    pub txid: Txid,
    /// Satoshis sent to the destination
    pub send_amount: u64,
    /// Change returned to the locked address, if any
    pub change: Option<u64>,
    pub fee: u64,
    /// Consensus-encoded transaction
    pub tx_hex: String,
}
