//! Environment-based Configuration for the CLTV Wallet
//!
//! All sensitive values (keys) MUST come from environment variables,
//! never from hardcoded values.
//!
//! # Environment Variables
//!
//! - `CLTV_NETWORK` - "mainnet", "testnet", "signet" or "regtest" (default: "mainnet")
//! - `CLTV_TEST_NETWORK` - network assumed for non-mainnet addresses on a mainnet
//!   deployment (default: "testnet"; must equal `CLTV_NETWORK` otherwise)
//! - `CLTV_ESPLORA_URL` - Esplora API endpoint (default per network)
//! - `CLTV_ACCOUNT` - default account address
//! - `CLTV_SIGNER_KEY` - hex-encoded signing key (required on mainnet)
//! - `CLTV_STORE` - "memory" or "sqlite" (default: "sqlite")
//! - `CLTV_DB_PATH` - SQLite database path
//! - `CLTV_FEE_TARGET_BLOCKS` - confirmation target for fee estimates (default: 6)
//! - `CLTV_LOG_LEVEL` - logging level (debug, info, warn, error)
//! - `CLTV_API_PORT` - JSON-RPC listen port (default: 3001)

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::chain::{ChainProvider, EsploraClient, SingleKeySigner, MAINNET_URL, SIGNET_URL, TESTNET_URL};
use crate::redemption::LockedOutputService;
use crate::storage::{LockedOutputStore, MemoryLockedOutputStore, SqliteLockedOutputStore};

/// Account used when a request names none
pub const DEFAULT_ACCOUNT: &str = "bc1qsyzegya3llxhcl22l770utl749m40duvy0zxtd";

/// Seed for the development signing key
const POC_KEY_SEED: &[u8] = b"cltv-wallet-development-key";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("network mismatch: expected {0}, got {1}")]
    NetworkMismatch(String, String),

    #[error("failed to open store: {0}")]
    Store(String),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(ConfigError::InvalidValue(
                "CLTV_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Default Esplora API for this network
    pub fn default_esplora_url(&self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_URL,
            Network::Testnet => TESTNET_URL,
            Network::Signet => SIGNET_URL,
            Network::Regtest => "http://localhost:3002",
        }
    }

    /// Get bitcoin network enum
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

/// Locked output store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            _ => Err(ConfigError::InvalidValue(
                "CLTV_STORE".to_string(),
                format!("unknown store: {} (use 'memory' or 'sqlite')", s),
            )),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Network locked outputs are registered on
    pub network: Network,

    /// Network assumed for spend addresses that are not mainnet
    pub test_network: Network,

    pub esplora_url: String,

    /// Account used when a request names none
    pub account: String,

    /// Hex signing key; `None` selects the derived development key
    pub signer_key: Option<String>,

    pub store: StoreBackend,

    pub db_path: String,

    pub fee_target_blocks: u16,

    pub log_level: String,

    pub api_port: u16,
}

impl WalletConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network: Network = var("CLTV_NETWORK")
            .unwrap_or_else(|| "mainnet".to_string())
            .parse()?;

        // Off mainnet, spends must infer the same network registration checks against
        let test_network: Network = match var("CLTV_TEST_NETWORK") {
            Some(value) => value.parse()?,
            None if network == Network::Mainnet => Network::Testnet,
            None => network,
        };
        if test_network == Network::Mainnet {
            return Err(ConfigError::InvalidValue(
                "CLTV_TEST_NETWORK".to_string(),
                "must not be mainnet".to_string(),
            ));
        }
        if network != Network::Mainnet && test_network != network {
            return Err(ConfigError::NetworkMismatch(
                format!("{:?}", network),
                format!("CLTV_TEST_NETWORK={:?}", test_network),
            ));
        }

        let esplora_url =
            var("CLTV_ESPLORA_URL").unwrap_or_else(|| network.default_esplora_url().to_string());

        let account = var("CLTV_ACCOUNT").unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());

        let signer_key = var("CLTV_SIGNER_KEY").filter(|key| !key.trim().is_empty());
        if signer_key.is_none() && network == Network::Mainnet {
            return Err(ConfigError::MissingEnvVar("CLTV_SIGNER_KEY".to_string()));
        }

        let store: StoreBackend = var("CLTV_STORE")
            .unwrap_or_else(|| "sqlite".to_string())
            .parse()?;

        let db_path = var("CLTV_DB_PATH").unwrap_or_else(|| "data/locked_outputs.db".to_string());

        let fee_target_blocks = parse_or("CLTV_FEE_TARGET_BLOCKS", var("CLTV_FEE_TARGET_BLOCKS"), 6)?;
        let api_port = parse_or("CLTV_API_PORT", var("CLTV_API_PORT"), 3001)?;

        let log_level = var("CLTV_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            network,
            test_network,
            esplora_url,
            account,
            signer_key,
            store,
            db_path,
            fee_target_blocks,
            log_level,
            api_port,
        })
    }

    /// Validate configuration for production readiness
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.network != Network::Mainnet {
            return Err(ConfigError::NetworkMismatch(
                "mainnet".to_string(),
                format!("{:?}", self.network),
            ));
        }

        if self.signer_key.is_none() {
            return Err(ConfigError::MissingEnvVar("CLTV_SIGNER_KEY".to_string()));
        }

        if self.store == StoreBackend::Memory {
            return Err(ConfigError::InvalidValue(
                "CLTV_STORE".to_string(),
                "in-memory store not allowed for production".to_string(),
            ));
        }

        Ok(())
    }

    /// Signer for the configured key
    pub fn signer(&self) -> Result<SingleKeySigner, ConfigError> {
        match &self.signer_key {
            Some(key) => SingleKeySigner::from_hex(key)
                .map_err(|e| ConfigError::InvalidValue("CLTV_SIGNER_KEY".to_string(), e.to_string())),
            None => {
                tracing::warn!(
                    target: "cltv::security",
                    "using derived development key - DO NOT USE WITH REAL FUNDS"
                );
                SingleKeySigner::from_seed(POC_KEY_SEED)
                    .map_err(|e| ConfigError::InvalidValue("CLTV_SIGNER_KEY".to_string(), e.to_string()))
            }
        }
    }

    /// Esplora client for the configured endpoint
    pub fn esplora_client(&self) -> EsploraClient {
        EsploraClient::new(&self.esplora_url).with_fee_target(self.fee_target_blocks)
    }

    /// Open the configured locked output store
    pub fn open_store(&self) -> Result<Arc<dyn LockedOutputStore>, ConfigError> {
        match self.store {
            StoreBackend::Memory => Ok(Arc::new(MemoryLockedOutputStore::new())),
            StoreBackend::Sqlite => SqliteLockedOutputStore::new(&self.db_path)
                .map(|store| Arc::new(store) as Arc<dyn LockedOutputStore>)
                .map_err(|e| ConfigError::Store(e.to_string())),
        }
    }

    /// Wire store, Esplora provider and signer into a service
    pub fn service(&self) -> Result<LockedOutputService, ConfigError> {
        self.service_with(Arc::new(self.esplora_client()))
    }

    /// Same wiring as [`WalletConfig::service`] over another chain provider
    pub fn service_with(
        &self,
        provider: Arc<dyn ChainProvider>,
    ) -> Result<LockedOutputService, ConfigError> {
        Ok(LockedOutputService::new(
            self.open_store()?,
            provider,
            Arc::new(self.signer()?),
            self.network.bitcoin_network(),
            self.test_network.bitcoin_network(),
            self.account.clone(),
        ))
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== CLTV Wallet Configuration ===");
        println!("Network: {:?}", self.network);
        println!("Test Network: {:?}", self.test_network);
        println!("Esplora API: {}", self.esplora_url);
        println!("Default Account: {}", self.account);
        println!(
            "Signer: {}",
            if self.signer_key.is_some() {
                "configured key"
            } else {
                "derived development key"
            }
        );
        match self.store {
            StoreBackend::Memory => println!("Store: memory"),
            StoreBackend::Sqlite => println!("Store: sqlite ({})", self.db_path),
        }
        println!("Fee Target: {} blocks", self.fee_target_blocks);
        println!("Log Level: {}", self.log_level);
        println!("=================================");
    }
}

fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(v) => v
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), format!("not a number: {}", v))),
        None => Ok(default),
    }
}
