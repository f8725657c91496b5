//! Signing and Finalization
//!
//! Signs every input of an unsigned redemption, validates all signatures,
//! then assembles the final scriptSig (P2SH) or witness (P2WSH) for the
//! script template of each input:
//!
//! ```text
//! SinglePubkeyCltv  <sig>
//! PubkeyHashCltv    <sig> <pubkey>
//! MultisigCltv      OP_0 <sig_1> .. <sig_m>
//! ```
//!
//! followed by the embedded script itself. Nothing here touches the network.

use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{consensus, ecdsa, PublicKey, ScriptBuf, Transaction, Txid, Witness};

use crate::chain::{Signer, SignerError};
use crate::redemption::builder::UnsignedRedemption;
use crate::script::{parse, RedeemScript, RedeemScriptKind, ScriptDecodeError, ScriptMode};

/// A signature over one input, with the key that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSignature {
    pub pubkey: PublicKey,
    pub signature: ecdsa::Signature,
    /// Digest that was signed
    pub sighash: [u8; 32],
}

/// Signed, serialized redemption
#[derive(Debug, Clone)]
pub struct FinalizedRedemption {
    pub tx: Transaction,
    /// Consensus encoding of `tx`
    pub raw: Vec<u8>,
    pub hex: String,
    pub txid: Txid,
    pub fee: u64,
    pub send_amount: u64,
    pub change: Option<u64>,
}

/// Finalization errors
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("unsupported script: {0}")]
    UnsupportedScript(RedeemScriptKind),

    #[error("incomplete signatures: need {required}, have {got}")]
    IncompleteSignatures { required: usize, got: usize },

    #[error("signature validation failed on input {input}: {reason}")]
    SignatureValidation { input: usize, reason: String },

    #[error("input {input} is missing {what}")]
    MissingInputData { input: usize, what: &'static str },

    #[error(transparent)]
    ScriptDecode(#[from] ScriptDecodeError),

    #[error("signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("sighash error: {0}")]
    Sighash(String),

    #[error("failed to assemble input {input}: {reason}")]
    Assembly { input: usize, reason: String },

    #[error("failed to extract transaction: {0}")]
    Extract(String),
}

/// Sign, validate, finalize and serialize `unsigned`
pub fn sign_and_finalize(
    unsigned: UnsignedRedemption,
    signer: &dyn Signer,
) -> Result<FinalizedRedemption, FinalizeError> {
    let UnsignedRedemption {
        mut psbt,
        mode,
        fee,
        send_amount,
        change,
        ..
    } = unsigned;

    let scripts = psbt
        .inputs
        .iter()
        .enumerate()
        .map(|(i, input)| embedded_script(input, mode, i))
        .collect::<Result<Vec<_>, _>>()?;

    let sighashes = {
        let mut cache = SighashCache::new(&psbt.unsigned_tx);
        let mut sighashes = Vec::with_capacity(scripts.len());
        for (i, script) in scripts.iter().enumerate() {
            let digest = match mode {
                ScriptMode::Legacy => cache
                    .legacy_signature_hash(i, script, EcdsaSighashType::All.to_u32())
                    .map_err(|e| FinalizeError::Sighash(e.to_string()))?
                    .to_byte_array(),
                ScriptMode::Segwit => {
                    let value = psbt.inputs[i]
                        .witness_utxo
                        .as_ref()
                        .map(|out| out.value)
                        .ok_or(FinalizeError::MissingInputData {
                            input: i,
                            what: "witness utxo",
                        })?;
                    cache
                        .p2wsh_signature_hash(i, script, value, EcdsaSighashType::All)
                        .map_err(|e| FinalizeError::Sighash(e.to_string()))?
                        .to_byte_array()
                }
            };
            sighashes.push(digest);
        }
        sighashes
    };

    // Signing order is kept here; psbt.partial_sigs is keyed by pubkey.
    let pubkey = signer.public_key();
    let mut signatures: Vec<Vec<PartialSignature>> = Vec::with_capacity(sighashes.len());
    for (input, sighash) in psbt.inputs.iter_mut().zip(&sighashes) {
        let signature = ecdsa::Signature {
            signature: signer.sign(sighash)?,
            sighash_type: EcdsaSighashType::All,
        };
        input.partial_sigs.insert(pubkey, signature);
        signatures.push(vec![PartialSignature {
            pubkey,
            signature,
            sighash: *sighash,
        }]);
    }

    let redeems = scripts
        .iter()
        .map(|script| parse(script.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;

    for (i, (redeem, sigs)) in redeems.iter().zip(&signatures).enumerate() {
        validate_signatures(i, redeem, sigs)?;
    }

    for (i, ((input, redeem), sigs)) in psbt
        .inputs
        .iter_mut()
        .zip(&redeems)
        .zip(&signatures)
        .enumerate()
    {
        let stack = assemble_unlock_stack(redeem, sigs)?;
        let script = &scripts[i];

        match mode {
            ScriptMode::Legacy => {
                let mut builder = Builder::new();
                for item in stack.into_iter().chain(std::iter::once(script.to_bytes())) {
                    let push = PushBytesBuf::try_from(item).map_err(|e| FinalizeError::Assembly {
                        input: i,
                        reason: e.to_string(),
                    })?;
                    builder = builder.push_slice(push);
                }
                input.final_script_sig = Some(builder.into_script());
            }
            ScriptMode::Segwit => {
                let mut witness = Witness::new();
                for item in &stack {
                    witness.push(item);
                }
                witness.push(script.as_bytes());
                input.final_script_witness = Some(witness);
            }
        }

        input.partial_sigs.clear();
        input.redeem_script = None;
        input.witness_script = None;
    }

    let tx = psbt
        .extract_tx()
        .map_err(|e| FinalizeError::Extract(e.to_string()))?;
    let raw = consensus::encode::serialize(&tx);
    let hex = hex::encode(&raw);
    let txid = tx.compute_txid();

    tracing::debug!(
        target: "cltv::redemption",
        %txid,
        inputs = tx.input.len(),
        size = raw.len(),
        "redemption finalized"
    );

    Ok(FinalizedRedemption {
        tx,
        raw,
        hex,
        txid,
        fee,
        send_amount,
        change,
    })
}

fn embedded_script(
    input: &bitcoin::psbt::Input,
    mode: ScriptMode,
    index: usize,
) -> Result<ScriptBuf, FinalizeError> {
    let (script, what) = match mode {
        ScriptMode::Legacy => (&input.redeem_script, "redeem script"),
        ScriptMode::Segwit => (&input.witness_script, "witness script"),
    };
    script
        .clone()
        .ok_or(FinalizeError::MissingInputData { input: index, what })
}

/// Every signature must verify and come from a key the script commits to
fn validate_signatures(
    input: usize,
    redeem: &RedeemScript,
    signatures: &[PartialSignature],
) -> Result<(), FinalizeError> {
    let secp = Secp256k1::verification_only();

    for sig in signatures {
        let msg = Message::from_digest(sig.sighash);
        secp.verify_ecdsa(&msg, &sig.signature.signature, &sig.pubkey.inner)
            .map_err(|e| FinalizeError::SignatureValidation {
                input,
                reason: e.to_string(),
            })?;

        if redeem.commits_to(&sig.pubkey) == Some(false) {
            return Err(FinalizeError::SignatureValidation {
                input,
                reason: format!("key {} is not committed to by the script", sig.pubkey),
            });
        }
    }

    Ok(())
}

/// Unlock stack items (excluding the embedded script) for `redeem`
pub fn assemble_unlock_stack(
    redeem: &RedeemScript,
    signatures: &[PartialSignature],
) -> Result<Vec<Vec<u8>>, FinalizeError> {
    let kind = redeem.kind();
    if kind == RedeemScriptKind::MultisigHashCltv {
        return Err(FinalizeError::UnsupportedScript(kind));
    }

    let Some(first) = signatures.first() else {
        return Err(FinalizeError::IncompleteSignatures {
            required: redeem.required_signatures(),
            got: 0,
        });
    };

    match kind {
        RedeemScriptKind::MultisigCltv => {
            let required = redeem.required_signatures();
            if signatures.len() != required {
                return Err(FinalizeError::IncompleteSignatures {
                    required,
                    got: signatures.len(),
                });
            }
            // CHECKMULTISIG pops one extra element
            let mut stack = vec![Vec::new()];
            stack.extend(signatures.iter().map(|s| s.signature.to_vec()));
            Ok(stack)
        }
        RedeemScriptKind::PubkeyHashCltv => {
            Ok(vec![first.signature.to_vec(), first.pubkey.to_bytes()])
        }
        RedeemScriptKind::SinglePubkeyCltv => Ok(vec![first.signature.to_vec()]),
        RedeemScriptKind::MultisigHashCltv => Err(FinalizeError::UnsupportedScript(kind)),
    }
}
