//! Signer abstraction
//!
//! Key material and signature schemes live outside this crate. The pipeline
//! only needs the account's public key hash, its public key (for reveals) and
//! a way to sign forged bytes under a watermark.

use async_trait::async_trait;
use thiserror::Error;

/// Prefix byte prepended to the payload before hashing and signing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    Block,
    Endorsement,
    GenericOperation,
}

impl Watermark {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Watermark::Block => &[0x01],
            Watermark::Endorsement => &[0x02],
            Watermark::GenericOperation => &[0x03],
        }
    }
}

/// Output of a signing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResult {
    /// Hex bytes that were signed (without watermark)
    pub bytes: String,
    /// Raw signature, hex
    pub sig: String,
    /// Base58 prefixed signature (`edsig...`, `spsig1...`, `p2sig...`)
    pub prefix_sig: String,
    /// Forged bytes with the raw signature appended, ready for injection
    pub sbytes: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("Signer cannot sign: {0}")]
    Unsupported(String),

    #[error("Signing failed: {0}")]
    Failed(String),

    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),
}

/// Async signer trait
#[async_trait]
pub trait Signer: Send + Sync {
    async fn public_key_hash(&self) -> Result<String, SignerError>;

    async fn public_key(&self) -> Result<String, SignerError>;

    /// Sign hex `bytes` under `watermark`
    async fn sign(&self, bytes: &str, watermark: Watermark) -> Result<SignResult, SignerError>;
}

/// Identity-only signer: knows an account's keys but holds no secret.
/// Enough for preparing and estimating; any attempt to sign fails.
#[derive(Debug, Clone)]
pub struct PublicKeySigner {
    pkh: String,
    public_key: String,
}

impl PublicKeySigner {
    pub fn new(pkh: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            pkh: pkh.into(),
            public_key: public_key.into(),
        }
    }
}

#[async_trait]
impl Signer for PublicKeySigner {
    async fn public_key_hash(&self) -> Result<String, SignerError> {
        Ok(self.pkh.clone())
    }

    async fn public_key(&self) -> Result<String, SignerError> {
        Ok(self.public_key.clone())
    }

    async fn sign(&self, _bytes: &str, _watermark: Watermark) -> Result<SignResult, SignerError> {
        Err(SignerError::Unsupported(format!(
            "{} is configured without a secret key",
            self.pkh
        )))
    }
}

/// Placeholder when no signer has been configured
#[derive(Debug, Clone, Default)]
pub struct NoopSigner;

#[async_trait]
impl Signer for NoopSigner {
    async fn public_key_hash(&self) -> Result<String, SignerError> {
        Err(SignerError::KeyUnavailable("no signer configured".to_string()))
    }

    async fn public_key(&self) -> Result<String, SignerError> {
        Err(SignerError::KeyUnavailable("no signer configured".to_string()))
    }

    async fn sign(&self, _bytes: &str, _watermark: Watermark) -> Result<SignResult, SignerError> {
        Err(SignerError::KeyUnavailable("no signer configured".to_string()))
    }
}
