//! Redemption Transaction Builder
//!
//! Builds the unsigned PSBT that spends the outputs locked at a CLTV
//! address. Every input carries the data the signer needs: the parent
//! transaction and redeem script for P2SH, the spent output and witness
//! script for P2WSH.

use bitcoin::{
    absolute::LockTime, consensus, psbt::Psbt, transaction::Version, Address, Amount, Network,
    OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use futures_util::future::try_join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::chain::{ChainProvider, ProviderError, Utxo};
use crate::redemption::coin_select::{self, InputProfile, Selection, SelectionError, SelectionParams};
use crate::script::{
    infer_network, parse, parse_for_network, wrap_address, AddressError, RedeemScript,
    ScriptDecodeError, ScriptMode,
};
use crate::types::RedemptionRequest;

/// Builds unsigned redemption transactions
pub struct RedemptionBuilder {
    provider: Arc<dyn ChainProvider>,
    /// Network assumed for addresses that are not valid on mainnet
    test_network: Network,
}

impl RedemptionBuilder {
    pub fn new(provider: Arc<dyn ChainProvider>, test_network: Network) -> Self {
        Self {
            provider,
            test_network,
        }
    }

    /// Build an unsigned redemption for `request`
    pub async fn build(&self, request: &RedemptionRequest) -> Result<UnsignedRedemption, BuilderError> {
        let mode = ScriptMode::from_address(&request.from);
        let (from, network) = infer_network(&request.from, self.test_network)?;
        let to = parse_for_network(&request.to, network)?;

        let redeem_script = ScriptBuf::from_bytes(request.redeem_script.clone());
        let redeem = parse(redeem_script.as_bytes())?;

        let wrapped = wrap_address(&redeem_script, mode, network)?;
        if wrapped != from {
            return Err(BuilderError::AddressMismatch {
                address: request.from.clone(),
                derived: wrapped.to_string(),
            });
        }

        let (fee_rate, utxos) = tokio::try_join!(
            self.provider.fee_rate(),
            self.provider.utxos(&request.from)
        )?;

        let from_spk = from.script_pubkey();
        let params = SelectionParams {
            input: InputProfile::for_script(&redeem, redeem_script.len(), mode),
            destination_script_len: to.script_pubkey().len(),
            change_script_len: from_spk.len(),
            fee_rate,
            amount: request.amount,
        };
        let selection = coin_select::select(&utxos, &params)?;

        tracing::debug!(
            target: "cltv::redemption",
            from = %request.from,
            %network,
            %mode,
            kind = %redeem.kind(),
            inputs = selection.inputs.len(),
            fee = selection.fee,
            fee_rate,
            "coins selected"
        );

        let tx = build_transaction(&redeem, &selection, &to, &from)?;
        let mut psbt =
            Psbt::from_unsigned_tx(tx).map_err(|e| BuilderError::Psbt(e.to_string()))?;

        match mode {
            ScriptMode::Legacy => {
                let parents = self.fetch_parents(&selection.inputs).await?;
                for (input, utxo) in psbt.inputs.iter_mut().zip(&selection.inputs) {
                    let parent = parents
                        .get(&utxo.txid)
                        .ok_or_else(|| BuilderError::InvalidParentTx(utxo.txid.to_string()))?;
                    check_parent(parent, utxo)?;

                    input.non_witness_utxo = Some(parent.clone());
                    input.redeem_script = Some(redeem_script.clone());
                }
            }
            ScriptMode::Segwit => {
                for (input, utxo) in psbt.inputs.iter_mut().zip(&selection.inputs) {
                    input.witness_utxo = Some(TxOut {
                        value: Amount::from_sat(utxo.value),
                        script_pubkey: from_spk.clone(),
                    });
                    input.witness_script = Some(redeem_script.clone());
                }
            }
        }

        Ok(UnsignedRedemption {
            psbt,
            redeem,
            redeem_script,
            mode,
            network,
            fee: selection.fee,
            send_amount: selection.send_amount,
            change: selection.change,
            skipped_utxos: utxos.len() - selection.inputs.len(),
        })
    }

    /// Fetch each distinct parent transaction once, concurrently
    async fn fetch_parents(&self, utxos: &[Utxo]) -> Result<HashMap<Txid, Transaction>, BuilderError> {
        let txids: BTreeSet<Txid> = utxos.iter().map(|u| u.txid).collect();

        let parents = try_join_all(txids.iter().map(|txid| self.fetch_parent(*txid))).await?;

        Ok(txids.into_iter().zip(parents).collect())
    }

    async fn fetch_parent(&self, txid: Txid) -> Result<Transaction, BuilderError> {
        let raw = self.provider.raw_transaction(&txid).await?;
        let bytes = hex::decode(raw.trim())
            .map_err(|e| BuilderError::InvalidParentTx(format!("{}: {}", txid, e)))?;
        let tx: Transaction = consensus::encode::deserialize(&bytes)
            .map_err(|e| BuilderError::InvalidParentTx(format!("{}: {}", txid, e)))?;

        if tx.compute_txid() != txid {
            return Err(BuilderError::InvalidParentTx(format!(
                "{}: provider returned {}",
                txid,
                tx.compute_txid()
            )));
        }

        Ok(tx)
    }
}

fn build_transaction(
    redeem: &RedeemScript,
    selection: &Selection,
    to: &Address,
    from: &Address,
) -> Result<Transaction, BuilderError> {
    let input = selection
        .inputs
        .iter()
        .map(|utxo| TxIn {
            previous_output: OutPoint {
                txid: utxo.txid,
                vout: utxo.vout,
            },
            script_sig: ScriptBuf::new(),
            // Below final so OP_CHECKLOCKTIMEVERIFY is enforced, no RBF signal
            sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
            witness: Witness::new(),
        })
        .collect();

    let mut output = vec![TxOut {
        value: Amount::from_sat(selection.send_amount),
        script_pubkey: to.script_pubkey(),
    }];
    if let Some(change) = selection.change {
        output.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: from.script_pubkey(),
        });
    }

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::from_consensus(redeem.lock_time()),
        input,
        output,
    })
}

fn check_parent(parent: &Transaction, utxo: &Utxo) -> Result<(), BuilderError> {
    let output = parent.output.get(utxo.vout as usize).ok_or_else(|| {
        BuilderError::InvalidParentTx(format!("{} has no output {}", utxo.txid, utxo.vout))
    })?;

    if output.value.to_sat() != utxo.value {
        return Err(BuilderError::InvalidParentTx(format!(
            "{}:{} value {} does not match {}",
            utxo.txid,
            utxo.vout,
            output.value.to_sat(),
            utxo.value
        )));
    }

    Ok(())
}

/// Unsigned redemption ready for signing
#[derive(Debug, Clone)]
pub struct UnsignedRedemption {
    pub psbt: Psbt,
    /// Parsed form of `redeem_script`
    pub redeem: RedeemScript,
    pub redeem_script: ScriptBuf,
    pub mode: ScriptMode,
    pub network: Network,
    /// Fee in satoshis
    pub fee: u64,
    /// Amount being sent
    pub send_amount: u64,
    /// Change back to the locked address
    pub change: Option<u64>,
    /// UTXOs at the locked address left out of this spend
    pub skipped_utxos: usize,
}

impl UnsignedRedemption {
    /// Get transaction ID (will change after signing for P2SH)
    pub fn txid(&self) -> Txid {
        self.psbt.unsigned_tx.compute_txid()
    }
}

/// Builder errors
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("redeem script does not wrap to {address} (derived {derived})")]
    AddressMismatch { address: String, derived: String },

    #[error(transparent)]
    ScriptDecode(#[from] ScriptDecodeError),

    #[error("insufficient funds: need {required} sats, have {available} sats")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("fee calculation failed: {0}")]
    FeeCalculation(String),

    #[error("amount {0} sats is below the dust limit")]
    BelowDust(u64),

    #[error("invalid parent transaction: {0}")]
    InvalidParentTx(String),

    #[error("psbt error: {0}")]
    Psbt(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl From<SelectionError> for BuilderError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::InsufficientFunds {
                required,
                available,
            } => BuilderError::InsufficientFunds {
                required,
                available,
            },
            SelectionError::FeeCalculation(msg) => BuilderError::FeeCalculation(msg),
            SelectionError::BelowDust(amount) => BuilderError::BelowDust(amount),
        }
    }
}
