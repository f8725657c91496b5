//! Common Error Types for the CLTV Wallet
//!
//! Folds the per-module errors into one root error with a stable code.

use thiserror::Error;

use crate::chain::ProviderError;
use crate::redemption::builder::BuilderError;
use crate::redemption::finalizer::FinalizeError;
use crate::redemption::service::ServiceError;
use crate::storage::StorageError;

/// Root error type for the wallet
#[derive(Debug, Error)]
pub enum WalletError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    /// Request failed validation before any chain access
    #[error("validation error: {0}")]
    Validation(String),

    /// Script could not be disassembled
    #[error("script decode error: {0}")]
    ScriptDecode(String),

    #[error("address mismatch: {0}")]
    AddressMismatch(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("fee calculation error: {0}")]
    FeeCalculation(String),

    #[error("unsupported script: {0}")]
    UnsupportedScript(String),

    #[error("incomplete signatures: {0}")]
    IncompleteSignatures(String),

    #[error("signature validation error: {0}")]
    SignatureValidation(String),

    /// UTXO / fee / broadcast provider errors
    #[error("provider error: {0}")]
    Provider(String),

    /// Broadcast rejected by the network
    #[error("broadcast error: {0}")]
    Broadcast(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WalletError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WalletError::Provider(_)
                | WalletError::Broadcast(_)
                | WalletError::Storage(_)
                | WalletError::Io(_)
        )
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            WalletError::Config(_) => "CONFIG_ERROR",
            WalletError::Logging(_) => "LOGGING_ERROR",
            WalletError::Validation(_) => "VALIDATION_ERROR",
            WalletError::ScriptDecode(_) => "SCRIPT_DECODE_ERROR",
            WalletError::AddressMismatch(_) => "ADDRESS_MISMATCH",
            WalletError::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            WalletError::FeeCalculation(_) => "FEE_CALCULATION_ERROR",
            WalletError::UnsupportedScript(_) => "UNSUPPORTED_SCRIPT",
            WalletError::IncompleteSignatures(_) => "INCOMPLETE_SIGNATURES",
            WalletError::SignatureValidation(_) => "SIGNATURE_VALIDATION_ERROR",
            WalletError::Provider(_) => "PROVIDER_ERROR",
            WalletError::Broadcast(_) => "BROADCAST_ERROR",
            WalletError::Storage(_) => "STORAGE_ERROR",
            WalletError::Internal(_) => "INTERNAL_ERROR",
            WalletError::Io(_) => "IO_ERROR",
        }
    }

    /// Code a service error maps to, without consuming it
    pub fn code_for(err: &ServiceError) -> &'static str {
        variant_for(err)(String::new()).error_code()
    }
}

type Variant = fn(String) -> WalletError;

/// Root variant a service error folds into
fn variant_for(err: &ServiceError) -> Variant {
    match err {
        ServiceError::InvalidScript(_) | ServiceError::ZeroLockTime | ServiceError::NotRegistered(_) => {
            WalletError::Validation
        }
        ServiceError::AddressMismatch(_) => WalletError::AddressMismatch,
        ServiceError::ScriptDecode(_) => WalletError::ScriptDecode,
        ServiceError::Builder(e) => builder_variant(e),
        ServiceError::Finalize(e) => finalize_variant(e),
        ServiceError::Provider(e) => provider_variant(e),
        ServiceError::Storage(_) => WalletError::Storage,
    }
}

fn builder_variant(err: &BuilderError) -> Variant {
    match err {
        BuilderError::InvalidAddress(_) | BuilderError::BelowDust(_) => WalletError::Validation,
        BuilderError::AddressMismatch { .. } => WalletError::AddressMismatch,
        BuilderError::ScriptDecode(_) => WalletError::ScriptDecode,
        BuilderError::InsufficientFunds { .. } => WalletError::InsufficientFunds,
        BuilderError::FeeCalculation(_) => WalletError::FeeCalculation,
        BuilderError::Provider(e) => provider_variant(e),
        BuilderError::InvalidParentTx(_) => WalletError::Provider,
        BuilderError::Psbt(_) => WalletError::Internal,
    }
}

fn finalize_variant(err: &FinalizeError) -> Variant {
    match err {
        FinalizeError::UnsupportedScript(_) => WalletError::UnsupportedScript,
        FinalizeError::IncompleteSignatures { .. } => WalletError::IncompleteSignatures,
        FinalizeError::SignatureValidation { .. } => WalletError::SignatureValidation,
        FinalizeError::ScriptDecode(_) => WalletError::ScriptDecode,
        _ => WalletError::Internal,
    }
}

fn provider_variant(err: &ProviderError) -> Variant {
    match err {
        ProviderError::Broadcast(_) => WalletError::Broadcast,
        _ => WalletError::Provider,
    }
}

impl From<ServiceError> for WalletError {
    fn from(err: ServiceError) -> Self {
        variant_for(&err)(err.to_string())
    }
}

impl From<StorageError> for WalletError {
    fn from(err: StorageError) -> Self {
        WalletError::Storage(err.to_string())
    }
}

impl From<ProviderError> for WalletError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Broadcast(msg) => WalletError::Broadcast(msg),
            other => WalletError::Provider(other.to_string()),
        }
    }
}

/// Result type alias using WalletError
pub type Result<T> = std::result::Result<T, WalletError>;
