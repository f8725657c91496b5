//! Address Verification for Locked Outputs
//!
//! Confirms that a claimed address really is the P2SH or P2WSH wrapping of a
//! redeem script. This is the gate that keeps an address/script pair that do
//! not belong together out of the locked-output store.

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, Script, ScriptBuf};
use serde::Serialize;
use std::str::FromStr;

/// Consensus limit for a P2SH redeem script push
pub const MAX_REDEEM_SCRIPT_SIZE: usize = 520;

/// Standardness limit for a P2WSH witness script
pub const MAX_WITNESS_SCRIPT_SIZE: usize = 10_000;

/// How the redeem script is wrapped by the locked output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptMode {
    /// P2SH, redeem script in the scriptSig
    Legacy,
    /// P2WSH, witness script in the witness
    Segwit,
}

impl ScriptMode {
    /// Base58 P2SH addresses are 34 or 35 characters long; anything else is
    /// treated as a bech32 P2WSH address.
    pub fn from_address(address: &str) -> Self {
        match address.len() {
            34 | 35 => ScriptMode::Legacy,
            _ => ScriptMode::Segwit,
        }
    }

    pub fn is_witness(&self) -> bool {
        matches!(self, ScriptMode::Segwit)
    }
}

impl std::fmt::Display for ScriptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Legacy => write!(f, "p2sh"),
            Self::Segwit => write!(f, "p2wsh"),
        }
    }
}

/// Address wrapping errors
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("invalid address: {0}")]
    Invalid(String),

    #[error("redeem script too large for {mode}: {size} bytes")]
    ScriptTooLarge { mode: ScriptMode, size: usize },

    #[error("address {address} is not valid for {network}")]
    WrongNetwork { address: String, network: Network },
}

/// Derive the address wrapping `redeem_script` in the given mode
pub fn wrap_address(
    redeem_script: &Script,
    mode: ScriptMode,
    network: Network,
) -> Result<Address, AddressError> {
    match mode {
        ScriptMode::Legacy => {
            if redeem_script.len() > MAX_REDEEM_SCRIPT_SIZE {
                return Err(AddressError::ScriptTooLarge {
                    mode,
                    size: redeem_script.len(),
                });
            }
            Address::p2sh(redeem_script, network).map_err(|e| AddressError::Invalid(e.to_string()))
        }
        ScriptMode::Segwit => {
            if redeem_script.len() > MAX_WITNESS_SCRIPT_SIZE {
                return Err(AddressError::ScriptTooLarge {
                    mode,
                    size: redeem_script.len(),
                });
            }
            Ok(Address::p2wsh(redeem_script, network))
        }
    }
}

/// scriptPubKey of the output that locks `redeem_script`
pub fn script_pubkey_for(redeem_script: &Script, mode: ScriptMode) -> Result<ScriptBuf, AddressError> {
    // The output script does not depend on the network.
    wrap_address(redeem_script, mode, Network::Bitcoin).map(|address| address.script_pubkey())
}

/// Check that `claimed_address` wraps `redeem_script` on `network`
///
/// Never fails: any script that cannot be wrapped yields `false`, which the
/// caller must treat as a rejected request.
pub fn verify(claimed_address: &str, redeem_script: &[u8], network: Network) -> bool {
    let mode = ScriptMode::from_address(claimed_address);
    let script = Script::from_bytes(redeem_script);

    match wrap_address(script, mode, network) {
        Ok(address) => address.to_string() == claimed_address,
        Err(e) => {
            tracing::debug!(target: "cltv::security", error = %e, "redeem script cannot be wrapped");
            false
        }
    }
}

/// Parse an address and infer its network
///
/// Addresses valid for mainnet are mainnet; every other address is assigned
/// to `test_network`, the configured alternate network.
pub fn infer_network(address: &str, test_network: Network) -> Result<(Address, Network), AddressError> {
    let unchecked = Address::<NetworkUnchecked>::from_str(address)
        .map_err(|e| AddressError::Invalid(format!("{}: {}", address, e)))?;

    let network = if unchecked.is_valid_for_network(Network::Bitcoin) {
        Network::Bitcoin
    } else {
        test_network
    };

    let checked = unchecked
        .require_network(network)
        .map_err(|_| AddressError::WrongNetwork {
            address: address.to_string(),
            network,
        })?;

    Ok((checked, network))
}

/// Parse an address that must belong to `network`
pub fn parse_for_network(address: &str, network: Network) -> Result<Address, AddressError> {
    Address::<NetworkUnchecked>::from_str(address)
        .map_err(|e| AddressError::Invalid(format!("{}: {}", address, e)))?
        .require_network(network)
        .map_err(|_| AddressError::WrongNetwork {
            address: address.to_string(),
            network,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::opcodes::all::*;
    use bitcoin::script::Builder;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::PublicKey;

    fn cltv_script(seed: u8) -> ScriptBuf {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
        Builder::new()
            .push_int(500_000)
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_key(&PublicKey::new(sk.public_key(&secp)))
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    #[test]
    fn test_mode_from_length() {
        assert_eq!(
            ScriptMode::from_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"),
            ScriptMode::Legacy
        );
        assert_eq!(
            ScriptMode::from_address("2N2JD6wb56AfK4tfmM6PwdVmoYk2dCKf4Br"),
            ScriptMode::Legacy
        );
        assert_eq!(
            ScriptMode::from_address("bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3"),
            ScriptMode::Segwit
        );
    }

    #[test]
    fn test_verify_p2sh() {
        let script = cltv_script(1);
        let address = wrap_address(&script, ScriptMode::Legacy, Network::Bitcoin).unwrap();
        let address = address.to_string();

        assert_eq!(address.len(), 34);
        assert!(address.starts_with('3'));
        assert!(verify(&address, script.as_bytes(), Network::Bitcoin));
    }

    #[test]
    fn test_verify_p2wsh() {
        let script = cltv_script(2);
        let address = wrap_address(&script, ScriptMode::Segwit, Network::Bitcoin)
            .unwrap()
            .to_string();

        assert!(address.starts_with("bc1q"));
        assert!(verify(&address, script.as_bytes(), Network::Bitcoin));
    }

    #[test]
    fn test_verify_42_char_bech32_uses_p2wsh() {
        // A 42 character bech32 address is never read as P2SH; the P2WSH
        // wrapping of any script is 62 characters so it cannot match.
        let script = cltv_script(2);
        let p2wpkh = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        assert_eq!(p2wpkh.len(), 42);
        assert_eq!(ScriptMode::from_address(p2wpkh), ScriptMode::Segwit);
        assert!(!verify(p2wpkh, script.as_bytes(), Network::Bitcoin));
    }

    #[test]
    fn test_verify_rejects_other_script() {
        let script = cltv_script(3);
        let other = cltv_script(4);
        let address = wrap_address(&script, ScriptMode::Legacy, Network::Bitcoin)
            .unwrap()
            .to_string();

        assert!(!verify(&address, other.as_bytes(), Network::Bitcoin));
    }

    #[test]
    fn test_verify_rejects_wrong_network() {
        let script = cltv_script(5);
        let address = wrap_address(&script, ScriptMode::Segwit, Network::Testnet)
            .unwrap()
            .to_string();

        assert!(verify(&address, script.as_bytes(), Network::Testnet));
        assert!(!verify(&address, script.as_bytes(), Network::Bitcoin));
    }

    #[test]
    fn test_verify_rejects_oversized_p2sh_script() {
        let script = vec![OP_NOP.to_u8(); MAX_REDEEM_SCRIPT_SIZE + 1];
        let address = Address::p2wsh(Script::from_bytes(&script), Network::Bitcoin).to_string();

        // 34 characters forces the legacy path
        assert!(!verify("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy", &script, Network::Bitcoin));
        assert!(verify(&address, &script, Network::Bitcoin));
    }

    #[test]
    fn test_infer_network() {
        let (_, network) =
            infer_network("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4", Network::Testnet).unwrap();
        assert_eq!(network, Network::Bitcoin);

        let (_, network) =
            infer_network("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx", Network::Testnet).unwrap();
        assert_eq!(network, Network::Testnet);

        let p2sh = wrap_address(&cltv_script(7), ScriptMode::Legacy, Network::Testnet)
            .unwrap()
            .to_string();
        let (_, network) = infer_network(&p2sh, Network::Testnet).unwrap();
        assert_eq!(network, Network::Testnet);

        assert!(infer_network("not-an-address", Network::Testnet).is_err());
    }

    #[test]
    fn test_script_pubkey_for() {
        let script = cltv_script(6);
        let p2sh = script_pubkey_for(&script, ScriptMode::Legacy).unwrap();
        let p2wsh = script_pubkey_for(&script, ScriptMode::Segwit).unwrap();

        assert!(p2sh.is_p2sh());
        assert!(p2wsh.is_p2wsh());
    }
}
