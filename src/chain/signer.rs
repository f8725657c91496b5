//! Signing Capability
//!
//! Keys never reach the redemption code directly; it only sees the `Signer`
//! trait. Key storage (env var, file, HSM) can change behind it.

use bitcoin::secp256k1::{self, ecdsa, Message, Secp256k1, SecretKey};
use bitcoin::PublicKey;

/// ECDSA signing capability for a single public key
pub trait Signer: Send + Sync {
    /// Compressed public key the signatures verify against
    fn public_key(&self) -> PublicKey;

    /// Sign a 32-byte sighash
    fn sign(&self, sighash: &[u8; 32]) -> Result<ecdsa::Signature, SignerError>;

    /// Signer type description
    fn signer_type(&self) -> &'static str;
}

/// Single-key signer
pub struct SingleKeySigner {
    secret_key: SecretKey,
    public_key: PublicKey,
    secp: Secp256k1<secp256k1::All>,
}

impl SingleKeySigner {
    pub fn new(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::new(secret_key.public_key(&secp));

        Self {
            secret_key,
            public_key,
            secp,
        }
    }

    /// Create from hex string
    pub fn from_hex(hex: &str) -> Result<Self, SignerError> {
        let bytes = hex::decode(hex.trim()).map_err(|e| SignerError::InvalidKey(e.to_string()))?;

        if bytes.len() != 32 {
            return Err(SignerError::InvalidKey("key must be 32 bytes".to_string()));
        }

        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::new(secret_key))
    }

    /// Create from a seed (deterministic - development networks only)
    pub fn from_seed(seed: &[u8]) -> Result<Self, SignerError> {
        use sha2::{Digest, Sha256};
        let hash: [u8; 32] = Sha256::digest(seed).into();

        let secret_key =
            SecretKey::from_slice(&hash).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::new(secret_key))
    }

    /// Generate a new random signer
    pub fn generate() -> Self {
        Self::new(SecretKey::new(&mut rand::thread_rng()))
    }

    /// Get secret key hex (for backup)
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }
}

impl Signer for SingleKeySigner {
    fn public_key(&self) -> PublicKey {
        self.public_key
    }

    fn sign(&self, sighash: &[u8; 32]) -> Result<ecdsa::Signature, SignerError> {
        let msg = Message::from_digest(*sighash);
        Ok(self.secp.sign_ecdsa(&msg, &self.secret_key))
    }

    fn signer_type(&self) -> &'static str {
        "single-key"
    }
}

/// Signer errors
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}
