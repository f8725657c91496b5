//! Register → exists → get → spend against a fixture chain provider

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{deserialize, serialize_hex};
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::*;
use bitcoin::script::{Builder, Instruction};
use bitcoin::transaction::Version;
use bitcoin::{Amount, Network, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cltv_wallet::chain::{ChainProvider, ProviderError, Signer, SingleKeySigner, Utxo};
use cltv_wallet::redemption::{BuilderError, FinalizeError, LockedOutputService, ServiceError};
use cltv_wallet::script::{self, wrap_address, RedeemScriptKind, ScriptMode};
use cltv_wallet::storage::MemoryLockedOutputStore;
use cltv_wallet::types::SpendAmount;

const ACCOUNT: &str = "tb1qaccount";
const DESTINATION: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
const LOCK_TIME: u32 = 500_000;
const FEE_RATE: u64 = 10;

/// In-memory chain: fixed UTXOs, parent transactions by id, recorded broadcasts
struct FixtureProvider {
    utxos: Vec<Utxo>,
    parents: HashMap<Txid, Transaction>,
    broadcasts: Mutex<Vec<Transaction>>,
}

impl FixtureProvider {
    fn new(parents: Vec<Transaction>) -> Self {
        let mut utxos = Vec::new();
        let mut by_id = HashMap::new();
        for parent in parents {
            let txid = parent.compute_txid();
            for (vout, output) in parent.output.iter().enumerate() {
                utxos.push(Utxo {
                    txid,
                    vout: vout as u32,
                    value: output.value.to_sat(),
                });
            }
            by_id.insert(txid, parent);
        }

        Self {
            utxos,
            parents: by_id,
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainProvider for FixtureProvider {
    async fn fee_rate(&self) -> Result<u64, ProviderError> {
        Ok(FEE_RATE)
    }

    async fn utxos(&self, _address: &str) -> Result<Vec<Utxo>, ProviderError> {
        Ok(self.utxos.clone())
    }

    async fn raw_transaction(&self, txid: &Txid) -> Result<String, ProviderError> {
        self.parents
            .get(txid)
            .map(serialize_hex)
            .ok_or_else(|| ProviderError::NotFound(txid.to_string()))
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> Result<Txid, ProviderError> {
        let bytes = hex::decode(raw_tx_hex).map_err(|e| ProviderError::Broadcast(e.to_string()))?;
        let tx: Transaction = deserialize(&bytes).map_err(|e| ProviderError::Broadcast(e.to_string()))?;
        let txid = tx.compute_txid();
        self.broadcasts.lock().unwrap().push(tx);
        Ok(txid)
    }
}

fn owner() -> SingleKeySigner {
    SingleKeySigner::from_seed(b"end-to-end").unwrap()
}

/// `<500000> OP_CLTV OP_DROP OP_DUP OP_HASH160 <hash160(pk)> OP_EQUALVERIFY OP_CHECKSIG`
fn pubkey_hash_script(signer: &SingleKeySigner) -> ScriptBuf {
    Builder::new()
        .push_int(LOCK_TIME as i64)
        .push_opcode(OP_CLTV)
        .push_opcode(OP_DROP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(signer.public_key().pubkey_hash().to_byte_array())
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

fn funding_tx(locked_at: &bitcoin::Address, value: u64) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn::default()],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: locked_at.script_pubkey(),
        }],
    }
}

struct Scenario {
    service: LockedOutputService,
    provider: Arc<FixtureProvider>,
    script: ScriptBuf,
    address: String,
}

/// 100000 sats locked at the script's address, spent by `signer`
fn scenario(mode: ScriptMode, value: u64, signer: SingleKeySigner) -> Scenario {
    let script = pubkey_hash_script(&owner());
    let locked_at = wrap_address(&script, mode, Network::Testnet).unwrap();
    let provider = Arc::new(FixtureProvider::new(vec![funding_tx(&locked_at, value)]));

    let service = LockedOutputService::new(
        Arc::new(MemoryLockedOutputStore::new()),
        provider.clone(),
        Arc::new(signer),
        Network::Testnet,
        Network::Testnet,
        ACCOUNT,
    );

    Scenario {
        service,
        provider,
        script,
        address: locked_at.to_string(),
    }
}

async fn register(s: &Scenario) {
    let lock_time = s
        .service
        .register(&s.address, &hex::encode(s.script.as_bytes()), None)
        .await
        .unwrap();
    assert_eq!(lock_time, LOCK_TIME);
}

fn assert_spends_after_lock(tx: &Transaction) {
    assert_eq!(tx.lock_time, LockTime::from_consensus(LOCK_TIME));
    assert!(tx
        .input
        .iter()
        .all(|input| input.sequence == Sequence::ENABLE_LOCKTIME_NO_RBF));
}

#[tokio::test]
async fn test_register_exists_get() {
    let s = scenario(ScriptMode::Segwit, 100_000, owner());
    assert!(!s.service.exists(None).await.unwrap());

    register(&s).await;

    assert!(s.service.exists(None).await.unwrap());
    let outputs = s.service.list(Some(ACCOUNT)).await.unwrap();
    let output = &outputs[&s.address];
    assert_eq!(output.script, hex::encode(s.script.as_bytes()));
    assert_eq!(output.lock_time, LOCK_TIME);

    let parsed = script::parse(s.script.as_bytes()).unwrap();
    assert_eq!(parsed.kind(), RedeemScriptKind::PubkeyHashCltv);
}

#[tokio::test]
async fn test_legacy_spend() {
    let s = scenario(ScriptMode::Legacy, 100_000, owner());
    assert!(s.address.starts_with('2'));
    register(&s).await;

    let receipt = s
        .service
        .spend(&s.address, DESTINATION, SpendAmount::Sweep, None)
        .await
        .unwrap();

    assert_eq!(receipt.send_amount + receipt.fee, 100_000);
    assert!(receipt.fee > 0);
    assert_eq!(receipt.change, None);

    let broadcasts = s.provider.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    let tx = &broadcasts[0];
    assert_eq!(tx.compute_txid(), receipt.txid);
    assert_spends_after_lock(tx);
    assert_eq!(tx.output.len(), 1);
    assert_eq!(tx.output[0].value.to_sat(), receipt.send_amount);

    // scriptSig: <sig> <pubkey> <redeem script>
    let pushes: Vec<Vec<u8>> = tx.input[0]
        .script_sig
        .instructions()
        .map(|i| match i.unwrap() {
            Instruction::PushBytes(bytes) => bytes.as_bytes().to_vec(),
            Instruction::Op(op) => panic!("unexpected opcode {}", op),
        })
        .collect();
    assert_eq!(pushes.len(), 3);
    assert_eq!(pushes[1], owner().public_key().to_bytes());
    assert_eq!(pushes[2], s.script.to_bytes());
    assert!(tx.input[0].witness.is_empty());

    // Fully swept output is forgotten
    assert!(!s.service.exists(None).await.unwrap());
}

#[tokio::test]
async fn test_segwit_spend() {
    let s = scenario(ScriptMode::Segwit, 100_000, owner());
    assert!(s.address.starts_with("tb1q"));
    register(&s).await;

    let receipt = s
        .service
        .spend(&s.address, DESTINATION, SpendAmount::Sweep, None)
        .await
        .unwrap();

    assert_eq!(receipt.send_amount + receipt.fee, 100_000);

    let broadcasts = s.provider.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    let tx = &broadcasts[0];
    assert_spends_after_lock(tx);
    assert!(tx.input[0].script_sig.is_empty());

    let witness = &tx.input[0].witness;
    assert_eq!(witness.len(), 3);
    assert_eq!(witness.nth(1).unwrap(), owner().public_key().to_bytes().as_slice());
    assert_eq!(witness.nth(2).unwrap(), s.script.as_bytes());
}

#[tokio::test]
async fn test_insufficient_funds() {
    let s = scenario(ScriptMode::Legacy, 1_000, owner());
    register(&s).await;

    let result = s
        .service
        .spend(&s.address, DESTINATION, SpendAmount::Sweep, None)
        .await;

    assert!(matches!(
        result,
        Err(ServiceError::Builder(BuilderError::InsufficientFunds { available: 1_000, .. }))
    ));
    assert!(s.provider.broadcasts().is_empty());
    assert!(s.service.exists(None).await.unwrap());
}

#[tokio::test]
async fn test_wrong_key_fails_validation() {
    let intruder = SingleKeySigner::from_seed(b"intruder").unwrap();
    let s = scenario(ScriptMode::Segwit, 100_000, intruder);
    register(&s).await;

    let result = s
        .service
        .spend(&s.address, DESTINATION, SpendAmount::Sweep, None)
        .await;

    assert!(matches!(
        result,
        Err(ServiceError::Finalize(FinalizeError::SignatureValidation { input: 0, .. }))
    ));
    assert!(s.provider.broadcasts().is_empty());
    assert!(s.service.exists(None).await.unwrap());
}

#[tokio::test]
async fn test_exact_amount_keeps_change() {
    let s = scenario(ScriptMode::Segwit, 100_000, owner());
    register(&s).await;

    let receipt = s
        .service
        .spend(&s.address, DESTINATION, SpendAmount::Exact(40_000), None)
        .await
        .unwrap();

    assert_eq!(receipt.send_amount, 40_000);
    let change = receipt.change.unwrap();
    assert_eq!(receipt.send_amount + change + receipt.fee, 100_000);

    let tx = &s.provider.broadcasts()[0];
    assert_eq!(tx.output.len(), 2);
    assert_eq!(tx.output[1].value.to_sat(), change);

    // Change returns to the locked address, so it stays registered
    assert!(s.service.exists(None).await.unwrap());
}
