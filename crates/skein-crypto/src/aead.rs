//! `XChaCha20-Poly1305` AEAD encryption.
//!
//! Name-service values are stored encrypted under a key derived from the name
//! itself; this module decrypts them (and encrypts them for tests and tools).
//!
//! ## Usage
//!
//! ```ignore
//! use skein_crypto::aead::{AeadKey, Nonce};
//!
//! let key = AeadKey::new([7u8; 32]);
//! let nonce = Nonce::generate(&mut OsRng);
//! let ciphertext = key.encrypt(&nonce, b"secret", b"")?;
//! let plaintext = key.decrypt(&nonce, &ciphertext, b"")?;
//! ```

use crate::CryptoError;
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand_core::{CryptoRng, RngCore};
use zeroize::ZeroizeOnDrop;

/// Authentication tag size (16 bytes / 128 bits).
pub const TAG_SIZE: usize = 16;

/// XChaCha20-Poly1305 nonce size (24 bytes / 192 bits).
pub const NONCE_SIZE: usize = 24;

/// AEAD key size (32 bytes / 256 bits).
pub const KEY_SIZE: usize = 32;

/// XChaCha20-Poly1305 nonce (24 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a nonce from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidNonceLength`] unless the slice is 24 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; NONCE_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidNonceLength)?;
        Ok(Self(bytes))
    }

    /// Generate a random nonce.
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    fn as_generic(&self) -> &XNonce {
        XNonce::from_slice(&self.0)
    }
}

/// AEAD encryption key (32 bytes). Zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Encrypt `plaintext`, authenticating `aad`. Output is ciphertext || tag.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] on cipher failure.
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new((&self.0).into());
        cipher
            .encrypt(nonce.as_generic(), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt ciphertext || tag, checking `aad`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if authentication fails or
    /// the input is shorter than a tag.
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        let cipher = XChaCha20Poly1305::new((&self.0).into());
        cipher
            .decrypt(nonce.as_generic(), Payload { msg: ciphertext, aad })
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}
