//! Redeem Script Module
//!
//! - `codec`: disassembles and classifies CLTV redeem scripts
//! - `address`: derives and verifies the P2SH/P2WSH address wrapping a script

pub mod address;
pub mod codec;

// Re-exports for convenience
pub use address::{
    infer_network, parse_for_network, script_pubkey_for, verify, wrap_address, AddressError,
    ScriptMode, MAX_REDEEM_SCRIPT_SIZE, MAX_WITNESS_SCRIPT_SIZE,
};
pub use codec::{
    decode_script_num, parse, parse_script, RedeemScript, RedeemScriptKind, ScriptDecodeError,
    ScriptTemplate, COMPRESSED_PUBKEY_LEN,
};
