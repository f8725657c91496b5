//! Coin Selection and Fee Estimation
//!
//! Fees are computed from the weight the finalized transaction will have:
//! each CLTV input carries its unlock stack plus the embedded script, in
//! the scriptSig (P2SH) or the witness (P2WSH).

use crate::chain::Utxo;
use crate::script::{RedeemScript, RedeemScriptKind, ScriptMode};
use crate::types::SpendAmount;

/// Outputs below this value are not relayed
pub const DUST_LIMIT: u64 = 546;

/// DER signature plus sighash byte, upper bound
const SIGNATURE_SIZE: usize = 73;
const PUBKEY_SIZE: usize = 33;

/// version + lock time
const TX_FIXED_SIZE: u64 = 8;
/// segwit marker + flag, counted in weight units
const SEGWIT_MARKER_WEIGHT: u64 = 2;
/// outpoint + sequence
const INPUT_FIXED_SIZE: u64 = 36 + 4;
const WITNESS_SCALE_FACTOR: u64 = 4;

/// Weight contributed by one input spending a given locked output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputProfile {
    pub weight: u64,
    pub witness: bool,
}

impl InputProfile {
    /// Profile of an input unlocking `redeem` (embedded script of
    /// `script_len` bytes) in `mode`
    pub fn for_script(redeem: &RedeemScript, script_len: usize, mode: ScriptMode) -> Self {
        let stack = unlock_stack_sizes(redeem);

        match mode {
            ScriptMode::Legacy => {
                let script_sig: usize = stack.iter().map(|len| push_size(*len)).sum::<usize>()
                    + push_size(script_len);
                let size = INPUT_FIXED_SIZE + varint_size(script_sig as u64) + script_sig as u64;
                Self {
                    weight: size * WITNESS_SCALE_FACTOR,
                    witness: false,
                }
            }
            ScriptMode::Segwit => {
                let items = stack.len() as u64 + 1;
                let witness: u64 = varint_size(items)
                    + stack
                        .iter()
                        .chain(std::iter::once(&script_len))
                        .map(|len| varint_size(*len as u64) + *len as u64)
                        .sum::<u64>();
                // empty scriptSig
                let size = INPUT_FIXED_SIZE + 1;
                Self {
                    weight: size * WITNESS_SCALE_FACTOR + witness,
                    witness: true,
                }
            }
        }
    }
}

/// Sizes of the unlock stack items for each template
fn unlock_stack_sizes(redeem: &RedeemScript) -> Vec<usize> {
    match redeem.kind() {
        RedeemScriptKind::MultisigCltv => {
            let mut sizes = vec![0];
            sizes.extend(std::iter::repeat(SIGNATURE_SIZE).take(redeem.required_signatures()));
            sizes
        }
        RedeemScriptKind::PubkeyHashCltv => vec![SIGNATURE_SIZE, PUBKEY_SIZE],
        RedeemScriptKind::SinglePubkeyCltv | RedeemScriptKind::MultisigHashCltv => {
            vec![SIGNATURE_SIZE]
        }
    }
}

/// Bytes taken by a minimal data push of `len` bytes
fn push_size(len: usize) -> usize {
    match len {
        0 => 1,
        1..=75 => 1 + len,
        76..=0xff => 2 + len,
        0x100..=0xffff => 3 + len,
        _ => 5 + len,
    }
}

fn varint_size(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

fn output_size(script_len: usize) -> u64 {
    8 + varint_size(script_len as u64) + script_len as u64
}

/// Fee for a transaction with `num_inputs` inputs of `input` profile and
/// outputs with the given scriptPubKey lengths
pub fn estimate_fee(
    input: InputProfile,
    num_inputs: usize,
    output_script_lens: &[usize],
    fee_rate: u64,
) -> Result<u64, SelectionError> {
    if fee_rate == 0 {
        return Err(SelectionError::FeeCalculation("fee rate is zero".to_string()));
    }

    let outputs: u64 = output_script_lens.iter().map(|len| output_size(*len)).sum();
    let base = TX_FIXED_SIZE
        + varint_size(num_inputs as u64)
        + varint_size(output_script_lens.len() as u64)
        + outputs;

    let weight = input
        .weight
        .checked_mul(num_inputs as u64)
        .and_then(|w| w.checked_add(base * WITNESS_SCALE_FACTOR))
        .and_then(|w| w.checked_add(if input.witness { SEGWIT_MARKER_WEIGHT } else { 0 }))
        .ok_or_else(|| SelectionError::FeeCalculation("weight overflow".to_string()))?;

    let vsize = weight.div_ceil(WITNESS_SCALE_FACTOR);
    vsize
        .checked_mul(fee_rate)
        .ok_or_else(|| SelectionError::FeeCalculation("fee overflow".to_string()))
}

/// Parameters for a selection
#[derive(Debug, Clone, Copy)]
pub struct SelectionParams {
    pub input: InputProfile,
    pub destination_script_len: usize,
    pub change_script_len: usize,
    /// sat/vbyte
    pub fee_rate: u64,
    pub amount: SpendAmount,
}

/// Chosen inputs and output values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<Utxo>,
    pub send_amount: u64,
    pub change: Option<u64>,
    pub fee: u64,
}

impl Selection {
    pub fn total_in(&self) -> u64 {
        self.inputs.iter().map(|u| u.value).sum()
    }
}

/// Selection errors
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("insufficient funds: need {required} sats, have {available} sats")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("fee calculation failed: {0}")]
    FeeCalculation(String),

    #[error("amount {0} sats is below the dust limit")]
    BelowDust(u64),
}

/// Select inputs for `params.amount`
pub fn select(utxos: &[Utxo], params: &SelectionParams) -> Result<Selection, SelectionError> {
    match params.amount {
        SpendAmount::Sweep => sweep(utxos, params),
        SpendAmount::Exact(amount) => exact(utxos, amount, params),
    }
}

/// Spend every UTXO worth more than the fee it adds
fn sweep(utxos: &[Utxo], params: &SelectionParams) -> Result<Selection, SelectionError> {
    let input_fee = params
        .input
        .weight
        .div_ceil(WITNESS_SCALE_FACTOR)
        .checked_mul(params.fee_rate)
        .ok_or_else(|| SelectionError::FeeCalculation("fee overflow".to_string()))?;

    let inputs: Vec<Utxo> = utxos.iter().filter(|u| u.value > input_fee).cloned().collect();
    let available: u64 = utxos.iter().map(|u| u.value).sum();

    let fee = estimate_fee(
        params.input,
        inputs.len().max(1),
        &[params.destination_script_len],
        params.fee_rate,
    )?;
    let total: u64 = inputs.iter().map(|u| u.value).sum();

    let send_amount = total.saturating_sub(fee);
    if inputs.is_empty() || send_amount < DUST_LIMIT {
        return Err(SelectionError::InsufficientFunds {
            required: fee + DUST_LIMIT,
            available,
        });
    }

    Ok(Selection {
        inputs,
        send_amount,
        change: None,
        fee,
    })
}

/// Largest-first accumulation until `amount` plus fee is covered
fn exact(utxos: &[Utxo], amount: u64, params: &SelectionParams) -> Result<Selection, SelectionError> {
    if amount < DUST_LIMIT {
        return Err(SelectionError::BelowDust(amount));
    }

    let mut sorted: Vec<&Utxo> = utxos.iter().collect();
    sorted.sort_by(|a, b| b.value.cmp(&a.value));

    let available: u64 = utxos.iter().map(|u| u.value).sum();
    let mut total: u64 = 0;
    let mut required = amount;

    for (i, utxo) in sorted.iter().enumerate() {
        total += utxo.value;
        let count = i + 1;

        let fee = estimate_fee(
            params.input,
            count,
            &[params.destination_script_len],
            params.fee_rate,
        )?;
        required = amount
            .checked_add(fee)
            .ok_or_else(|| SelectionError::FeeCalculation("amount overflow".to_string()))?;
        if total < required {
            continue;
        }

        let inputs: Vec<Utxo> = sorted[..count].iter().map(|u| (*u).clone()).collect();
        let remainder = total - required;

        let fee_with_change = estimate_fee(
            params.input,
            count,
            &[params.destination_script_len, params.change_script_len],
            params.fee_rate,
        )?;
        let change_cost = fee_with_change - fee;

        if remainder > DUST_LIMIT + change_cost {
            return Ok(Selection {
                inputs,
                send_amount: amount,
                change: Some(remainder - change_cost),
                fee: fee_with_change,
            });
        }

        return Ok(Selection {
            inputs,
            send_amount: amount,
            change: None,
            fee: total - amount,
        });
    }

    Err(SelectionError::InsufficientFunds {
        required,
        available,
    })
}
