//! CLTV Redeem Script Codec
//!
//! Decodes raw redeem script bytes and classifies them into one of the
//! supported time-locked templates:
//!
//! ```text
//! SinglePubkeyCltv  <L> OP_CLTV OP_DROP <pubkey> OP_CHECKSIG
//! PubkeyHashCltv    <L> OP_CLTV OP_DROP OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG
//! MultisigCltv      <L> OP_CLTV OP_DROP <m> <pk_1> .. <pk_n> <n> OP_CHECKMULTISIG
//! ```
//!
//! Anything that disassembles but does not match a template is classified as
//! `SinglePubkeyCltv`. This fallback is intentional: an unknown shape is
//! treated as the lowest-capability template, never escalated to multisig.
//! It is still lenient (an unrecognized script is reported as single-key
//! spendable) and worth revisiting.

use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::*;
use bitcoin::script::Instruction;
use bitcoin::{PublicKey, Script};
use serde::Serialize;

/// Size of a compressed secp256k1 public key
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Largest script number accepted by OP_CHECKLOCKTIMEVERIFY
const MAX_LOCKTIME_NUM_LEN: usize = 5;

/// Script template classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemScriptKind {
    SinglePubkeyCltv,
    PubkeyHashCltv,
    MultisigCltv,
    /// Reserved. The parser never produces it and it cannot be finalized.
    MultisigHashCltv,
}

impl std::fmt::Display for RedeemScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SinglePubkeyCltv => write!(f, "single-pubkey-cltv"),
            Self::PubkeyHashCltv => write!(f, "pubkey-hash-cltv"),
            Self::MultisigCltv => write!(f, "multisig-cltv"),
            Self::MultisigHashCltv => write!(f, "multisig-hash-cltv"),
        }
    }
}

/// Template parameters extracted from the script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptTemplate {
    SinglePubkey {
        /// Raw bytes of the 4th element, when the script has the 5 element shape
        #[serde(with = "hex_opt")]
        pubkey: Option<Vec<u8>>,
    },
    PubkeyHash {
        #[serde(with = "hex_bytes")]
        pubkey_hash: Vec<u8>,
    },
    Multisig {
        m: usize,
        n: usize,
        #[serde(with = "hex_keys")]
        pubkeys: Vec<[u8; COMPRESSED_PUBKEY_LEN]>,
    },
    MultisigHash,
}

/// A parsed CLTV redeem script
///
/// Built fresh from bytes on every [`parse`] call and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedeemScript {
    lock_time: u32,
    template: ScriptTemplate,
}

impl RedeemScript {
    /// Classification of this script
    pub fn kind(&self) -> RedeemScriptKind {
        match self.template {
            ScriptTemplate::SinglePubkey { .. } => RedeemScriptKind::SinglePubkeyCltv,
            ScriptTemplate::PubkeyHash { .. } => RedeemScriptKind::PubkeyHashCltv,
            ScriptTemplate::Multisig { .. } => RedeemScriptKind::MultisigCltv,
            ScriptTemplate::MultisigHash => RedeemScriptKind::MultisigHashCltv,
        }
    }

    /// Lock time pushed before OP_CHECKLOCKTIMEVERIFY (0 when absent)
    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    pub fn template(&self) -> &ScriptTemplate {
        &self.template
    }

    /// Raw single pubkey bytes
    pub fn pubkey(&self) -> Option<&[u8]> {
        match &self.template {
            ScriptTemplate::SinglePubkey { pubkey } => pubkey.as_deref(),
            _ => None,
        }
    }

    /// Required signatures for a multisig script
    pub fn m(&self) -> Option<usize> {
        match &self.template {
            ScriptTemplate::Multisig { m, .. } => Some(*m),
            _ => None,
        }
    }

    /// Total keys for a multisig script
    pub fn n(&self) -> Option<usize> {
        match &self.template {
            ScriptTemplate::Multisig { n, .. } => Some(*n),
            _ => None,
        }
    }

    /// Multisig keys in script order
    pub fn pubkeys(&self) -> &[[u8; COMPRESSED_PUBKEY_LEN]] {
        match &self.template {
            ScriptTemplate::Multisig { pubkeys, .. } => pubkeys,
            _ => &[],
        }
    }

    /// Number of signatures needed to satisfy the script
    pub fn required_signatures(&self) -> usize {
        self.m().unwrap_or(1)
    }

    /// Whether `key` is committed to by the script
    ///
    /// Returns `None` when the script embeds no key to compare against
    /// (degenerate single-pubkey fallback, reserved multisig-hash).
    pub fn commits_to(&self, key: &PublicKey) -> Option<bool> {
        match &self.template {
            ScriptTemplate::SinglePubkey { pubkey: Some(pk) } => Some(pk[..] == key.to_bytes()[..]),
            ScriptTemplate::SinglePubkey { pubkey: None } => None,
            ScriptTemplate::PubkeyHash { pubkey_hash } => {
                Some(pubkey_hash[..] == key.pubkey_hash().as_byte_array()[..])
            }
            ScriptTemplate::Multisig { pubkeys, .. } => {
                let bytes = key.to_bytes();
                Some(pubkeys.iter().any(|pk| pk[..] == bytes[..]))
            }
            ScriptTemplate::MultisigHash => None,
        }
    }

    fn fallback(lock_time: u32) -> Self {
        Self {
            lock_time,
            template: ScriptTemplate::SinglePubkey { pubkey: None },
        }
    }
}

/// The script bytes could not be disassembled
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("script decode error: {0}")]
pub struct ScriptDecodeError(pub String);

/// Parse raw redeem script bytes
pub fn parse(bytes: &[u8]) -> Result<RedeemScript, ScriptDecodeError> {
    parse_script(Script::from_bytes(bytes))
}

/// Parse a redeem script
///
/// Fails only when the byte stream cannot be disassembled.
pub fn parse_script(script: &Script) -> Result<RedeemScript, ScriptDecodeError> {
    let elements = script
        .instructions()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ScriptDecodeError(e.to_string()))?;

    Ok(classify(&elements))
}

fn classify(elements: &[Instruction<'_>]) -> RedeemScript {
    let len = elements.len();

    let has_prefix = len > 4
        && is_op(&elements[1], OP_CLTV)
        && is_op(&elements[2], OP_DROP);
    if !has_prefix {
        return RedeemScript::fallback(0);
    }

    let lock_time = match decode_lock_time(&elements[0]) {
        Some(lock_time) => lock_time,
        None => return RedeemScript::fallback(0),
    };

    let last = &elements[len - 1];

    if is_op(last, OP_CHECKMULTISIG) && len > 5 {
        if let Some(template) = classify_multisig(elements) {
            return RedeemScript { lock_time, template };
        }
        return RedeemScript::fallback(lock_time);
    }

    if is_op(last, OP_CHECKSIG) {
        if len == 5 {
            let pubkey = match &elements[3] {
                Instruction::PushBytes(bytes) => Some(bytes.as_bytes().to_vec()),
                Instruction::Op(_) => None,
            };
            return RedeemScript {
                lock_time,
                template: ScriptTemplate::SinglePubkey { pubkey },
            };
        }

        if len == 8
            && is_op(&elements[3], OP_DUP)
            && is_op(&elements[4], OP_HASH160)
            && is_op(&elements[6], OP_EQUALVERIFY)
        {
            if let Instruction::PushBytes(hash) = &elements[5] {
                return RedeemScript {
                    lock_time,
                    template: ScriptTemplate::PubkeyHash {
                        pubkey_hash: hash.as_bytes().to_vec(),
                    },
                };
            }
        }
    }

    RedeemScript::fallback(lock_time)
}

/// `<L> OP_CLTV OP_DROP <m> <pk_1> .. <pk_n> <n> OP_CHECKMULTISIG`
fn classify_multisig(elements: &[Instruction<'_>]) -> Option<ScriptTemplate> {
    let len = elements.len();
    let n = small_int(&elements[len - 2])?;
    let m = small_int(&elements[3])?;

    // m, n pubkeys, n, OP_CHECKMULTISIG after the 3 prefix elements
    if 4 + n + 2 != len {
        return None;
    }

    let mut pubkeys = Vec::with_capacity(n);
    for element in &elements[4..4 + n] {
        match element {
            Instruction::PushBytes(bytes) => {
                let key: [u8; COMPRESSED_PUBKEY_LEN] = bytes.as_bytes().try_into().ok()?;
                pubkeys.push(key);
            }
            Instruction::Op(_) => return None,
        }
    }

    if m == 0 || m >= n {
        return None;
    }

    Some(ScriptTemplate::Multisig { m, n, pubkeys })
}

fn is_op(element: &Instruction<'_>, opcode: bitcoin::Opcode) -> bool {
    matches!(element, Instruction::Op(op) if *op == opcode)
}

/// Value of an OP_1..OP_16 push (opcode minus OP_RESERVED)
fn small_int(element: &Instruction<'_>) -> Option<usize> {
    match element {
        Instruction::Op(op) => {
            let code = op.to_u8();
            let base = OP_RESERVED.to_u8();
            if code > base && code <= OP_PUSHNUM_16.to_u8() {
                Some((code - base) as usize)
            } else {
                None
            }
        }
        Instruction::PushBytes(_) => None,
    }
}

fn decode_lock_time(element: &Instruction<'_>) -> Option<u32> {
    let value = match element {
        Instruction::PushBytes(bytes) => decode_script_num(bytes.as_bytes())?,
        Instruction::Op(op) => {
            let code = op.to_u8();
            if code == OP_PUSHNUM_NEG1.to_u8() {
                -1
            } else {
                small_int(element)? as i64
            }
        }
    };

    u32::try_from(value).ok()
}

/// Decode a minimally encoded script number of at most 5 bytes
pub fn decode_script_num(bytes: &[u8]) -> Option<i64> {
    let Some((&last, _)) = bytes.split_last() else {
        return Some(0);
    };
    if bytes.len() > MAX_LOCKTIME_NUM_LEN {
        return None;
    }

    // The most significant byte may only be 0x00/0x80 when the next byte
    // needs its sign bit.
    if last & 0x7f == 0 && (bytes.len() == 1 || bytes[bytes.len() - 2] & 0x80 == 0) {
        return None;
    }

    let mut value: i64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        value |= (*byte as i64) << (8 * i);
    }

    if last & 0x80 != 0 {
        let sign_bit = 0x80i64 << (8 * (bytes.len() - 1));
        Some(-(value & !sign_bit))
    } else {
        Some(value)
    }
}

mod hex_bytes {
    pub fn serialize<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }
}

mod hex_opt {
    pub fn serialize<S: serde::Serializer>(
        bytes: &Option<Vec<u8>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }
}

mod hex_keys {
    use serde::ser::SerializeSeq;

    pub fn serialize<S: serde::Serializer>(
        keys: &[[u8; super::COMPRESSED_PUBKEY_LEN]],
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(keys.len()))?;
        for key in keys {
            seq.serialize_element(&hex::encode(key))?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::script::{Builder, PushBytesBuf};
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::ScriptBuf;

    fn key(seed: u8) -> PublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
        PublicKey::new(sk.public_key(&secp))
    }

    fn cltv_prefix(lock_time: i64) -> Builder {
        Builder::new()
            .push_int(lock_time)
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
    }

    fn multisig(lock_time: i64, m: i64, keys: &[Vec<u8>]) -> ScriptBuf {
        let mut builder = cltv_prefix(lock_time).push_int(m);
        for k in keys {
            builder = builder.push_slice(PushBytesBuf::try_from(k.clone()).unwrap());
        }
        builder
            .push_int(keys.len() as i64)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script()
    }

    #[test]
    fn test_multisig_round_trip() {
        let keys: Vec<Vec<u8>> = (1..=3).map(|i| key(i).to_bytes()).collect();
        let script = multisig(650_000, 2, &keys);

        let parsed = parse(script.as_bytes()).unwrap();

        assert_eq!(parsed.kind(), RedeemScriptKind::MultisigCltv);
        assert_eq!(parsed.m(), Some(2));
        assert_eq!(parsed.n(), Some(3));
        assert_eq!(parsed.lock_time(), 650_000);
        for (parsed_key, original) in parsed.pubkeys().iter().zip(&keys) {
            assert_eq!(&parsed_key[..], &original[..]);
        }
    }

    #[test]
    fn test_single_pubkey_classification() {
        let pk = key(7);
        let script = cltv_prefix(500_000)
            .push_key(&pk)
            .push_opcode(OP_CHECKSIG)
            .into_script();

        let parsed = parse(script.as_bytes()).unwrap();

        assert_eq!(parsed.kind(), RedeemScriptKind::SinglePubkeyCltv);
        assert_eq!(parsed.pubkey(), Some(&pk.to_bytes()[..]));
        assert_eq!(parsed.lock_time(), 500_000);
        assert_eq!(parsed.commits_to(&pk), Some(true));
        assert_eq!(parsed.commits_to(&key(8)), Some(false));
    }

    #[test]
    fn test_pubkey_hash_classification() {
        let pk = key(9);
        let script = cltv_prefix(1_700_000_000)
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(pk.pubkey_hash())
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
            .into_script();

        let parsed = parse(script.as_bytes()).unwrap();

        assert_eq!(parsed.kind(), RedeemScriptKind::PubkeyHashCltv);
        assert_eq!(parsed.lock_time(), 1_700_000_000);
        assert_eq!(parsed.commits_to(&pk), Some(true));
        assert_eq!(parsed.required_signatures(), 1);
    }

    #[test]
    fn test_multisig_threshold_not_below_n_falls_back() {
        let keys: Vec<Vec<u8>> = (1..=2).map(|i| key(i).to_bytes()).collect();
        let script = multisig(100, 2, &keys);

        let parsed = parse(script.as_bytes()).unwrap();

        assert_eq!(parsed.kind(), RedeemScriptKind::SinglePubkeyCltv);
        assert_eq!(parsed.m(), None);
        assert_eq!(parsed.lock_time(), 100);

        let script = multisig(100, 3, &keys);
        assert_eq!(
            parse(script.as_bytes()).unwrap().kind(),
            RedeemScriptKind::SinglePubkeyCltv
        );
    }

    #[test]
    fn test_multisig_uncompressed_key_falls_back() {
        let mut keys: Vec<Vec<u8>> = (1..=3).map(|i| key(i).to_bytes()).collect();
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[4; 32]).unwrap();
        keys[1] = sk.public_key(&secp).serialize_uncompressed().to_vec();

        let parsed = parse(multisig(100, 2, &keys).as_bytes()).unwrap();

        assert_eq!(parsed.kind(), RedeemScriptKind::SinglePubkeyCltv);
        assert!(parsed.pubkeys().is_empty());
    }

    #[test]
    fn test_multisig_invariant_holds_across_shapes() {
        for n in 1..=5usize {
            for m in 1..=6i64 {
                let keys: Vec<Vec<u8>> = (1..=n as u8).map(|i| key(i).to_bytes()).collect();
                let parsed = parse(multisig(42, m, &keys).as_bytes()).unwrap();
                if parsed.kind() == RedeemScriptKind::MultisigCltv {
                    let (m, n) = (parsed.m().unwrap(), parsed.n().unwrap());
                    assert!(m <= n);
                    assert_eq!(parsed.pubkeys().len(), n);
                } else {
                    assert_eq!(parsed.kind(), RedeemScriptKind::SinglePubkeyCltv);
                }
            }
        }
    }

    #[test]
    fn test_missing_prefix_defaults() {
        let pk = key(3);
        let script = Builder::new()
            .push_key(&pk)
            .push_opcode(OP_CHECKSIG)
            .into_script();

        let parsed = parse(script.as_bytes()).unwrap();
        assert_eq!(parsed.kind(), RedeemScriptKind::SinglePubkeyCltv);
        assert_eq!(parsed.lock_time(), 0);
        assert_eq!(parsed.pubkey(), None);
        assert_eq!(parsed.commits_to(&pk), None);
    }

    #[test]
    fn test_unknown_shape_keeps_lock_time() {
        let script = cltv_prefix(777)
            .push_opcode(OP_DUP)
            .push_opcode(OP_DROP)
            .push_opcode(OP_CHECKSIG)
            .into_script();

        let parsed = parse(script.as_bytes()).unwrap();
        assert_eq!(parsed.kind(), RedeemScriptKind::SinglePubkeyCltv);
        assert_eq!(parsed.lock_time(), 777);
    }

    #[test]
    fn test_truncated_push_is_decode_error() {
        // OP_PUSHBYTES_20 followed by only two bytes
        let bytes = [0x14, 0x01, 0x02];
        assert!(parse(&bytes).is_err());
    }

    #[test]
    fn test_small_lock_time_opcode() {
        let pk = key(5);
        let script = cltv_prefix(16)
            .push_key(&pk)
            .push_opcode(OP_CHECKSIG)
            .into_script();

        assert_eq!(parse(script.as_bytes()).unwrap().lock_time(), 16);
    }

    #[test]
    fn test_script_num_decoding() {
        assert_eq!(decode_script_num(&[]), Some(0));
        assert_eq!(decode_script_num(&[0x20, 0xa1, 0x07]), Some(500_000));
        assert_eq!(decode_script_num(&[0x81]), Some(-1));
        assert_eq!(decode_script_num(&[0xff, 0x00]), Some(255));
        // non-minimal
        assert_eq!(decode_script_num(&[0x01, 0x00]), None);
        assert_eq!(decode_script_num(&[0x00]), None);
        // too long for CLTV
        assert_eq!(decode_script_num(&[1, 2, 3, 4, 5, 6]), None);
        // 5-byte value above u32::MAX is decodable but not a lock time
        assert_eq!(decode_script_num(&[0, 0, 0, 0, 0x01]), Some(1 << 32));
    }

    #[test]
    fn test_negative_lock_time_is_degenerate() {
        let pk = key(5);
        let script = cltv_prefix(-5)
            .push_key(&pk)
            .push_opcode(OP_CHECKSIG)
            .into_script();

        let parsed = parse(script.as_bytes()).unwrap();
        assert_eq!(parsed.lock_time(), 0);
        assert_eq!(parsed.pubkey(), None);
    }
}
