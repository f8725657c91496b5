//! Esplora API Client
//!
//! Implements [`ChainProvider`] over the Esplora HTTP API: fee estimates,
//! address UTXOs, raw transactions and broadcasting.

use async_trait::async_trait;
use bitcoin::Txid;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

use super::provider::{ChainProvider, ProviderError, Utxo};

/// Esplora API endpoints
pub const MAINNET_URL: &str = "https://blockstream.info/api";
pub const TESTNET_URL: &str = "https://blockstream.info/testnet/api";
pub const SIGNET_URL: &str = "https://mempool.space/signet/api";

/// Fallback fee rate when the estimate map has no usable entry
const MIN_FEE_RATE: u64 = 1;

/// Esplora HTTP client
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: Client,
    base_url: String,
    /// Confirmation target used to pick a fee estimate
    fee_target_blocks: u16,
}

impl EsploraClient {
    /// Create a new client with custom URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            fee_target_blocks: 6,
        }
    }

    /// Create a client for Bitcoin mainnet
    pub fn new_mainnet() -> Self {
        Self::new(MAINNET_URL)
    }

    /// Create a client for Bitcoin testnet
    pub fn new_testnet() -> Self {
        Self::new(TESTNET_URL)
    }

    /// Set the confirmation target for fee estimates
    pub fn with_fee_target(mut self, blocks: u16) -> Self {
        self.fee_target_blocks = blocks.max(1);
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get fee estimates (confirmation target -> sat/vbyte)
    pub async fn get_fee_estimates(&self) -> Result<HashMap<String, f64>, EsploraError> {
        let url = format!("{}/fee-estimates", self.base_url);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(EsploraError::ParseError(format!(
                "fee estimates unavailable: {}",
                resp.status()
            )));
        }

        Ok(resp.json().await?)
    }

    /// Get address UTXOs
    pub async fn get_address_utxos(&self, address: &str) -> Result<Vec<EsploraUtxo>, EsploraError> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(EsploraError::AddressNotFound(address.to_string()));
        }

        Ok(resp.json().await?)
    }

    /// Get raw transaction hex
    pub async fn get_tx_hex(&self, txid: &str) -> Result<String, EsploraError> {
        let url = format!("{}/tx/{}/hex", self.base_url, txid);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(EsploraError::TxNotFound(txid.to_string()));
        }

        Ok(resp.text().await?)
    }

    /// Broadcast a raw transaction
    pub async fn broadcast_tx(&self, tx_hex: &str) -> Result<String, EsploraError> {
        let url = format!("{}/tx", self.base_url);
        let resp = self.client.post(&url).body(tx_hex.to_string()).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(EsploraError::BroadcastFailed(error_text));
        }

        let txid = resp.text().await?;
        Ok(txid.trim().to_string())
    }
}

/// Pick the estimate for `target`, or the nearest faster target available
pub fn select_fee_rate(estimates: &HashMap<String, f64>, target: u16) -> u64 {
    let mut by_target: Vec<(u16, f64)> = estimates
        .iter()
        .filter_map(|(k, v)| k.parse::<u16>().ok().map(|t| (t, *v)))
        .filter(|(_, v)| v.is_finite() && *v > 0.0)
        .collect();
    by_target.sort_by_key(|(t, _)| *t);

    let rate = by_target
        .iter()
        .rev()
        .find(|(t, _)| *t <= target)
        .or_else(|| by_target.first())
        .map(|(_, v)| v.ceil() as u64)
        .unwrap_or(MIN_FEE_RATE);

    rate.max(MIN_FEE_RATE)
}

#[async_trait]
impl ChainProvider for EsploraClient {
    async fn fee_rate(&self) -> Result<u64, ProviderError> {
        let estimates = self.get_fee_estimates().await?;
        Ok(select_fee_rate(&estimates, self.fee_target_blocks))
    }

    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError> {
        self.get_address_utxos(address)
            .await?
            .into_iter()
            .map(|u| {
                let txid = Txid::from_str(&u.txid)
                    .map_err(|e| ProviderError::Parse(format!("txid {}: {}", u.txid, e)))?;
                Ok(Utxo {
                    txid,
                    vout: u.vout,
                    value: u.value,
                })
            })
            .collect()
    }

    async fn raw_transaction(&self, txid: &Txid) -> Result<String, ProviderError> {
        Ok(self.get_tx_hex(&txid.to_string()).await?)
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> Result<Txid, ProviderError> {
        let txid = self.broadcast_tx(raw_tx_hex).await?;
        Txid::from_str(&txid).map_err(|e| ProviderError::Parse(format!("txid {}: {}", txid, e)))
    }
}

/// Transaction status
#[derive(Debug, Clone, Deserialize)]
pub struct EsploraTxStatus {
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub block_hash: Option<String>,
    pub block_time: Option<u64>,
}

/// UTXO information from Esplora
#[derive(Debug, Clone, Deserialize)]
pub struct EsploraUtxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub status: EsploraTxStatus,
}

/// Esplora error types
#[derive(Debug, thiserror::Error)]
pub enum EsploraError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Transaction not found: {0}")]
    TxNotFound(String),

    #[error("Address not found: {0}")]
    AddressNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Broadcast failed: {0}")]
    BroadcastFailed(String),
}

impl From<EsploraError> for ProviderError {
    fn from(err: EsploraError) -> Self {
        match err {
            EsploraError::HttpError(e) => ProviderError::Request(e.to_string()),
            EsploraError::TxNotFound(id) => ProviderError::NotFound(format!("transaction {}", id)),
            EsploraError::AddressNotFound(a) => ProviderError::NotFound(format!("address {}", a)),
            EsploraError::ParseError(msg) => ProviderError::Parse(msg),
            EsploraError::BroadcastFailed(msg) => ProviderError::Broadcast(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_urls() {
        let mainnet = EsploraClient::new_mainnet();
        assert_eq!(mainnet.base_url(), MAINNET_URL);

        let testnet = EsploraClient::new("https://blockstream.info/testnet/api/");
        assert_eq!(testnet.base_url(), TESTNET_URL);
    }

    #[test]
    fn test_select_fee_rate() {
        let estimates: HashMap<String, f64> = [
            ("1".to_string(), 25.3),
            ("3".to_string(), 12.1),
            ("6".to_string(), 8.0),
            ("144".to_string(), 1.2),
        ]
        .into_iter()
        .collect();

        assert_eq!(select_fee_rate(&estimates, 6), 8);
        assert_eq!(select_fee_rate(&estimates, 4), 13);
        assert_eq!(select_fee_rate(&estimates, 1000), 2);
        assert_eq!(select_fee_rate(&HashMap::new(), 6), MIN_FEE_RATE);
    }

    #[test]
    fn test_utxo_deserialization() {
        let json = r#"[{"txid":"5f0b1c0f8c1b9e8f6a6f2f3c1d1e0f0a0b0c0d0e0f101112131415161718191a","vout":1,"value":100000,
            "status":{"confirmed":true,"block_height":800000,"block_hash":null,"block_time":null}}]"#;
        let utxos: Vec<EsploraUtxo> = serde_json::from_str(json).unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].value, 100_000);
        assert!(utxos[0].status.confirmed);
    }

    #[test]
    fn test_error_mapping() {
        let err: ProviderError = EsploraError::BroadcastFailed("non-final".to_string()).into();
        assert!(matches!(err, ProviderError::Broadcast(_)));
    }
}
