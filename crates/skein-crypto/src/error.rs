//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid nonce length
    #[error("invalid nonce length")]
    InvalidNonceLength,

    /// Invalid message format
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// Key exchange produced a low-order point
    #[error("key exchange rejected low-order point")]
    LowOrderPoint,

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,

    /// Invalid signature
    #[error("invalid signature")]
    InvalidSignature,

    /// Invalid public key
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signing could not be performed with the supplied material
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Keypair bytes do not belong together
    #[error("keypair mismatch: public half does not match seed")]
    KeypairMismatch,
}
