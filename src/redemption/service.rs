//! Locked Output Service
//!
//! The three wallet operations: register a locked output, list an account's
//! locked outputs, and spend the outputs locked at an address.
//!
//! A spend is validated, built, signed and finalized locally before the one
//! broadcast call; the store is only touched after a successful broadcast.

use bitcoin::Network;
use std::sync::Arc;

use crate::chain::{ChainProvider, ProviderError, Signer};
use crate::common::logging::{
    generate_correlation_id, log_redemption_event, log_registration_event, log_security_event,
};
use crate::redemption::builder::{BuilderError, RedemptionBuilder};
use crate::redemption::finalizer::{sign_and_finalize, FinalizeError};
use crate::script::{self, ScriptDecodeError};
use crate::storage::{LockedOutputStore, StorageError};
use crate::types::{LockedOutputMap, RedemptionRequest, SpendAmount, SpendReceipt};

/// Locked output service
pub struct LockedOutputService {
    store: Arc<dyn LockedOutputStore>,
    provider: Arc<dyn ChainProvider>,
    signer: Arc<dyn Signer>,
    builder: RedemptionBuilder,
    /// Network locked outputs are registered on
    network: Network,
    default_account: String,
}

impl LockedOutputService {
    pub fn new(
        store: Arc<dyn LockedOutputStore>,
        provider: Arc<dyn ChainProvider>,
        signer: Arc<dyn Signer>,
        network: Network,
        test_network: Network,
        default_account: impl Into<String>,
    ) -> Self {
        tracing::info!(
            target: "cltv::redemption",
            signer = signer.signer_type(),
            pubkey = %signer.public_key(),
            %network,
            "locked output service ready"
        );

        Self {
            builder: RedemptionBuilder::new(provider.clone(), test_network),
            store,
            provider,
            signer,
            network,
            default_account: default_account.into(),
        }
    }

    pub fn default_account(&self) -> &str {
        &self.default_account
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Register the output locked at `address` by `script_hex`
    ///
    /// The address must be the P2SH/P2WSH wrapping of the script and the
    /// script must carry a non-zero lock time.
    pub async fn register(
        &self,
        address: &str,
        script_hex: &str,
        account: Option<&str>,
    ) -> Result<u32, ServiceError> {
        let account = account.unwrap_or(&self.default_account);
        let correlation_id = generate_correlation_id();

        let result = self.validate_registration(address, script_hex, &correlation_id);
        let lock_time = match result {
            Ok(lock_time) => lock_time,
            Err(e) => {
                let message = e.to_string();
                log_registration_event(
                    &correlation_id,
                    account,
                    address,
                    None,
                    Some((e.code(), message.as_str())),
                );
                return Err(e);
            }
        };

        self.store
            .add(address, &script_hex.to_lowercase(), account, lock_time)
            .await?;

        log_registration_event(&correlation_id, account, address, Some(lock_time), None);
        Ok(lock_time)
    }

    fn validate_registration(
        &self,
        address: &str,
        script_hex: &str,
        correlation_id: &str,
    ) -> Result<u32, ServiceError> {
        let bytes = hex::decode(script_hex).map_err(|e| ServiceError::InvalidScript(e.to_string()))?;

        if !script::verify(address, &bytes, self.network) {
            log_security_event(
                "address_mismatch",
                false,
                serde_json::json!({ "address": address, "network": self.network.to_string() }),
                Some(correlation_id),
            );
            return Err(ServiceError::AddressMismatch(address.to_string()));
        }

        let redeem = script::parse(&bytes)?;
        if redeem.lock_time() == 0 {
            return Err(ServiceError::ZeroLockTime);
        }

        Ok(redeem.lock_time())
    }

    /// Locked outputs of `account` (default account when `None`)
    pub async fn list(&self, account: Option<&str>) -> Result<LockedOutputMap, ServiceError> {
        let account = account.unwrap_or(&self.default_account);
        Ok(self.store.get(account).await?)
    }

    /// Whether `account` has any locked output
    pub async fn exists(&self, account: Option<&str>) -> Result<bool, ServiceError> {
        let account = account.unwrap_or(&self.default_account);
        Ok(self.store.exists(account).await?)
    }

    /// Spend the outputs locked at `from` to `to`
    ///
    /// The registration is dropped only when nothing is left at `from`: no
    /// change output and no UTXO skipped by the sweep as uneconomic.
    pub async fn spend(
        &self,
        from: &str,
        to: &str,
        amount: SpendAmount,
        account: Option<&str>,
    ) -> Result<SpendReceipt, ServiceError> {
        let correlation_id = generate_correlation_id();

        match self.spend_inner(from, to, amount, account).await {
            Ok(receipt) => {
                let txid = receipt.txid.to_string();
                log_redemption_event(&correlation_id, from, to, Some(&txid), Some(receipt.fee), None);
                Ok(receipt)
            }
            Err(e) => {
                let message = e.to_string();
                log_redemption_event(
                    &correlation_id,
                    from,
                    to,
                    None,
                    None,
                    Some((e.code(), message.as_str())),
                );
                Err(e)
            }
        }
    }

    async fn spend_inner(
        &self,
        from: &str,
        to: &str,
        amount: SpendAmount,
        account: Option<&str>,
    ) -> Result<SpendReceipt, ServiceError> {
        let account = account.unwrap_or(&self.default_account);
        let outputs = self.store.get(account).await?;
        let locked = outputs
            .get(from)
            .ok_or_else(|| ServiceError::NotRegistered(from.to_string()))?;

        let script = locked
            .script_bytes()
            .map_err(|e| ServiceError::InvalidScript(e.to_string()))?;
        let request = RedemptionRequest::new(from, to, script).with_amount(amount);

        let unsigned = self.builder.build(&request).await?;
        let skipped_utxos = unsigned.skipped_utxos;
        let finalized = sign_and_finalize(unsigned, self.signer.as_ref())?;

        let txid = self.provider.broadcast(&finalized.hex).await?;
        if txid != finalized.txid {
            tracing::warn!(
                target: "cltv::redemption",
                expected = %finalized.txid,
                reported = %txid,
                "provider reported a different txid"
            );
        }

        // Change or skipped UTXOs at `from` keep the locked output alive
        if finalized.change.is_none() && skipped_utxos == 0 {
            self.store.remove(from).await?;
        }

        Ok(SpendReceipt {
            txid: finalized.txid,
            send_amount: finalized.send_amount,
            change: finalized.change,
            fee: finalized.fee,
            tx_hex: finalized.hex,
        })
    }
}

/// Service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid script hex: {0}")]
    InvalidScript(String),

    #[error("address {0} does not wrap the given script")]
    AddressMismatch(String),

    #[error("script has no lock time")]
    ZeroLockTime,

    #[error("no locked output registered at {0}")]
    NotRegistered(String),

    #[error(transparent)]
    ScriptDecode(#[from] ScriptDecodeError),

    #[error(transparent)]
    Builder(#[from] BuilderError),

    #[error(transparent)]
    Finalize(#[from] FinalizeError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ServiceError {
    /// Stable code for API responses and logs
    pub fn code(&self) -> &'static str {
        crate::common::error::WalletError::code_for(self)
    }

    /// Whether the request was malformed rather than failing downstream
    pub fn is_invalid_params(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidScript(_)
                | ServiceError::AddressMismatch(_)
                | ServiceError::ZeroLockTime
                | ServiceError::NotRegistered(_)
                | ServiceError::ScriptDecode(_)
                | ServiceError::Builder(BuilderError::InvalidAddress(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MockChainProvider, SingleKeySigner, Utxo};
    use crate::redemption::builder::tests::{parent_tx, single_key_script, DEST_TESTNET};
    use crate::script::{wrap_address, ScriptMode};
    use crate::storage::MemoryLockedOutputStore;
    use bitcoin::ScriptBuf;

    const ACCOUNT: &str = "acct";

    struct Fixture {
        service: LockedOutputService,
        store: Arc<MemoryLockedOutputStore>,
        script: ScriptBuf,
        from: String,
    }

    fn fixture(mock: MockChainProvider, mode: ScriptMode) -> Fixture {
        let signer = SingleKeySigner::from_seed(b"service").unwrap();
        let script = single_key_script(&signer.public_key(), 500_000);
        let from = wrap_address(&script, mode, Network::Testnet).unwrap().to_string();
        let store = Arc::new(MemoryLockedOutputStore::new());

        let service = LockedOutputService::new(
            store.clone(),
            Arc::new(mock),
            Arc::new(signer),
            Network::Testnet,
            Network::Testnet,
            ACCOUNT,
        );

        Fixture {
            service,
            store,
            script,
            from,
        }
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let f = fixture(MockChainProvider::new(), ScriptMode::Segwit);
        let script_hex = hex::encode(f.script.as_bytes());

        let lock_time = f.service.register(&f.from, &script_hex, None).await.unwrap();

        assert_eq!(lock_time, 500_000);
        assert!(f.service.exists(None).await.unwrap());
        let listed = f.service.list(Some(ACCOUNT)).await.unwrap();
        assert_eq!(listed[&f.from].script, script_hex);
        assert_eq!(listed[&f.from].lock_time, 500_000);
        assert!(f.service.list(Some("other")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_mismatch() {
        let f = fixture(MockChainProvider::new(), ScriptMode::Legacy);
        let other = single_key_script(&SingleKeySigner::from_seed(b"x").unwrap().public_key(), 500_000);

        let result = f
            .service
            .register(&f.from, &hex::encode(other.as_bytes()), None)
            .await;

        assert!(matches!(result, Err(ServiceError::AddressMismatch(_))));
        assert!(!f.store.exists(ACCOUNT).await.unwrap());
    }

    #[tokio::test]
    async fn test_register_rejects_zero_lock_time() {
        let f = fixture(MockChainProvider::new(), ScriptMode::Segwit);
        let key = SingleKeySigner::from_seed(b"service").unwrap().public_key();
        let script = single_key_script(&key, 0);
        let from = wrap_address(&script, ScriptMode::Segwit, Network::Testnet)
            .unwrap()
            .to_string();

        let result = f.service.register(&from, &hex::encode(script.as_bytes()), None).await;

        assert!(matches!(result, Err(ServiceError::ZeroLockTime)));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_hex() {
        let f = fixture(MockChainProvider::new(), ScriptMode::Segwit);
        let result = f.service.register(&f.from, "zz", None).await;
        assert!(matches!(result, Err(ServiceError::InvalidScript(_))));
    }

    #[tokio::test]
    async fn test_spend_unregistered() {
        let f = fixture(MockChainProvider::new(), ScriptMode::Segwit);

        let result = f
            .service
            .spend(&f.from, DEST_TESTNET, SpendAmount::Sweep, None)
            .await;

        assert!(matches!(result, Err(ServiceError::NotRegistered(_))));
        assert!(result.unwrap_err().is_invalid_params());
    }

    #[tokio::test]
    async fn test_sweep_broadcasts_and_removes() {
        let signer = SingleKeySigner::from_seed(b"service").unwrap();
        let script = single_key_script(&signer.public_key(), 500_000);
        let txid = parent_tx(&script, ScriptMode::Segwit, &[100_000]).compute_txid();

        let mut mock = MockChainProvider::new();
        mock.expect_fee_rate().returning(|| Ok(10));
        mock.expect_utxos()
            .returning(move |_| Ok(vec![Utxo { txid, vout: 0, value: 100_000 }]));
        mock.expect_broadcast().times(1).returning(|raw| {
            let bytes = hex::decode(raw).unwrap();
            let tx: bitcoin::Transaction = bitcoin::consensus::encode::deserialize(&bytes).unwrap();
            Ok(tx.compute_txid())
        });

        let f = fixture(mock, ScriptMode::Segwit);
        f.service
            .register(&f.from, &hex::encode(f.script.as_bytes()), None)
            .await
            .unwrap();

        let receipt = f
            .service
            .spend(&f.from, DEST_TESTNET, SpendAmount::Sweep, None)
            .await
            .unwrap();

        assert_eq!(receipt.send_amount + receipt.fee, 100_000);
        assert_eq!(receipt.change, None);
        assert!(!f.service.exists(None).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_broadcast_keeps_registration() {
        let signer = SingleKeySigner::from_seed(b"service").unwrap();
        let script = single_key_script(&signer.public_key(), 500_000);
        let txid = parent_tx(&script, ScriptMode::Segwit, &[100_000]).compute_txid();

        let mut mock = MockChainProvider::new();
        mock.expect_fee_rate().returning(|| Ok(10));
        mock.expect_utxos()
            .returning(move |_| Ok(vec![Utxo { txid, vout: 0, value: 100_000 }]));
        mock.expect_broadcast()
            .returning(|_| Err(ProviderError::Broadcast("non-final".to_string())));

        let f = fixture(mock, ScriptMode::Segwit);
        f.service
            .register(&f.from, &hex::encode(f.script.as_bytes()), None)
            .await
            .unwrap();

        let result = f
            .service
            .spend(&f.from, DEST_TESTNET, SpendAmount::Sweep, None)
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::Provider(ProviderError::Broadcast(_)))
        ));
        assert!(f.store.exists(ACCOUNT).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_keeps_registration_with_skipped_utxos() {
        let signer = SingleKeySigner::from_seed(b"service").unwrap();
        let script = single_key_script(&signer.public_key(), 500_000);
        let txid = parent_tx(&script, ScriptMode::Segwit, &[100_000, 500]).compute_txid();

        let mut mock = MockChainProvider::new();
        mock.expect_fee_rate().returning(|| Ok(10));
        mock.expect_utxos().returning(move |_| {
            Ok(vec![
                Utxo { txid, vout: 0, value: 100_000 },
                Utxo { txid, vout: 1, value: 500 },
            ])
        });
        mock.expect_broadcast().times(1).returning(|raw| {
            let bytes = hex::decode(raw).unwrap();
            let tx: bitcoin::Transaction = bitcoin::consensus::encode::deserialize(&bytes).unwrap();
            assert_eq!(tx.input.len(), 1);
            Ok(tx.compute_txid())
        });

        let f = fixture(mock, ScriptMode::Segwit);
        f.service
            .register(&f.from, &hex::encode(f.script.as_bytes()), None)
            .await
            .unwrap();

        let receipt = f
            .service
            .spend(&f.from, DEST_TESTNET, SpendAmount::Sweep, None)
            .await
            .unwrap();

        assert_eq!(receipt.change, None);
        assert_eq!(receipt.send_amount + receipt.fee, 100_000);
        // The 500 sat output is still locked at `from`
        assert!(f.service.list(None).await.unwrap().contains_key(&f.from));
    }
}
