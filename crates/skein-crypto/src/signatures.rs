//! Ed25519 digital signatures for request authentication.
//!
//! Every authenticated storage request carries an Ed25519 signature over a
//! canonical byte string. This module wraps `ed25519-dalek` with:
//! - 64-byte signatures
//! - 32-byte public keys
//! - 32-byte seeds (zeroized on drop)
//! - Import from the 64-byte `seed || public` layout used by sodium-style key stores
//! - Deterministic signature generation
//!
//! ## Usage
//!
//! ```ignore
//! use skein_crypto::signatures::SigningKey;
//! use rand_core::OsRng;
//!
//! let signing_key = SigningKey::generate(&mut OsRng);
//! let signature = signing_key.sign(b"retrieve1700000000000");
//! assert!(signing_key.verifying_key().verify(b"retrieve1700000000000", &signature).is_ok());
//! ```

use crate::CryptoError;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{Signer, Verifier};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Ed25519 signature (64 bytes)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Create a signature from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Create a signature from a slice
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the slice is not exactly 64 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 64] = slice.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(bytes))
    }

    /// Get the raw signature bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    fn to_dalek(self) -> ed25519_dalek::Signature {
        ed25519_dalek::Signature::from_bytes(&self.0)
    }
}

/// Ed25519 signing key (private key)
///
/// Holds the 32-byte seed. Zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public", &self.verifying_key())
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Generate a new random signing key
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::generate(rng),
        }
    }

    /// Create from a raw 32-byte seed
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Create from the 64-byte `seed || public_key` layout.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] for a slice that is not 64
    /// bytes and [`CryptoError::KeypairMismatch`] if the public half was not
    /// derived from the seed half.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let keypair: [u8; 64] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: crate::ED25519_KEYPAIR_SIZE,
            actual: bytes.len(),
        })?;
        let inner = ed25519_dalek::SigningKey::from_keypair_bytes(&keypair)
            .map_err(|_| CryptoError::KeypairMismatch)?;
        Ok(Self { inner })
    }

    /// Sign a message. Deterministic for a given key and message.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.inner.sign(message).to_bytes())
    }

    /// Get the corresponding verifying key (public key)
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Export the 32-byte seed (handle with care)
    #[must_use]
    pub fn to_seed(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Expanded secret: the clamped signing scalar and the nonce prefix.
    ///
    /// Blinded signing needs the raw scalar rather than the seed.
    pub(crate) fn expanded(&self) -> ExpandedSecret {
        let digest = Sha512::digest(self.inner.to_bytes());
        let mut lower = [0u8; 32];
        lower.copy_from_slice(&digest[..32]);
        lower[0] &= 248;
        lower[31] &= 127;
        lower[31] |= 64;
        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&digest[32..]);
        let scalar = Scalar::from_bytes_mod_order(lower);
        lower.zeroize();
        ExpandedSecret { scalar, prefix }
    }
}

/// Expanded Ed25519 secret material.
#[derive(ZeroizeOnDrop)]
pub(crate) struct ExpandedSecret {
    pub(crate) scalar: Scalar,
    pub(crate) prefix: [u8; 32],
}

/// Ed25519 verifying key (public key)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

impl VerifyingKey {
    /// Create from raw 32-byte public key
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the bytes do not
    /// represent a valid Ed25519 point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { inner })
    }

    /// Get the raw public key bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Birationally map this key to its X25519 (Montgomery) form.
    ///
    /// Standard account ids carry the X25519 form of the owner's Ed25519 key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the point fails to decompress.
    pub fn to_x25519(&self) -> Result<[u8; 32], CryptoError> {
        CompressedEdwardsY(self.inner.to_bytes())
            .decompress()
            .map(|point| point.to_montgomery().to_bytes())
            .ok_or(CryptoError::InvalidPublicKey)
    }

    /// Verify a signature on a message
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the signature does not
    /// authenticate the message under this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        self.inner
            .verify(message, &signature.to_dalek())
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

/// Verify a signature given raw public key bytes.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPublicKey`] or [`CryptoError::InvalidSignature`].
pub fn verify_raw(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(public_key)?;
    let signature = Signature::from_slice(signature)?;
    key.verify(message, &signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
    use rand_core::OsRng;

    #[test]
    fn test_sign_verify_roundtrip() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        let message = b"retrieve1700000000000";
        let signature = signing_key.sign(message);

        assert!(verifying_key.verify(message, &signature).is_ok());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let key = SigningKey::from_seed(&[7u8; 32]);
        assert_eq!(key.sign(b"store11700000000000"), key.sign(b"store11700000000000"));
    }

    #[test]
    fn test_mutated_message_fails() {
        let key = SigningKey::from_seed(&[9u8; 32]);
        let signature = key.sign(b"retrieve1700000000000");

        let result = key.verifying_key().verify(b"retrieve1700000000001", &signature);
        assert_eq!(result, Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn test_keypair_bytes_import() {
        let key = SigningKey::from_seed(&[3u8; 32]);
        let mut keypair = [0u8; 64];
        keypair[..32].copy_from_slice(&key.to_seed());
        keypair[32..].copy_from_slice(&key.verifying_key().to_bytes());

        let restored = SigningKey::from_keypair_bytes(&keypair).unwrap();
        assert_eq!(restored.verifying_key(), key.verifying_key());
    }

    #[test]
    fn test_keypair_bytes_mismatch() {
        let key = SigningKey::from_seed(&[3u8; 32]);
        let mut keypair = [0u8; 64];
        keypair[..32].copy_from_slice(&key.to_seed());
        keypair[32..].copy_from_slice(&[1u8; 32]);

        assert!(SigningKey::from_keypair_bytes(&keypair).is_err());
        assert!(matches!(
            SigningKey::from_keypair_bytes(&[0u8; 10]),
            Err(CryptoError::InvalidKeyLength { expected: 64, actual: 10 })
        ));
    }

    #[test]
    fn test_expanded_scalar_matches_public_key() {
        let key = SigningKey::from_seed(&[5u8; 32]);
        let expanded = key.expanded();
        let point = &expanded.scalar * ED25519_BASEPOINT_TABLE;

        assert_eq!(point.compress().to_bytes(), key.verifying_key().to_bytes());
    }

    #[test]
    fn test_x25519_form_matches_x25519_dalek() {
        // The Montgomery form of an Ed25519 key equals X25519(clamped scalar, 9).
        let key = SigningKey::from_seed(&[8u8; 32]);
        let expanded = key.expanded();
        let montgomery = (&expanded.scalar * ED25519_BASEPOINT_TABLE).to_montgomery();
        assert_eq!(key.verifying_key().to_x25519().unwrap(), montgomery.to_bytes());
    }

    #[test]
    fn test_signature_from_slice_length() {
        assert!(Signature::from_slice(&[0u8; 63]).is_err());
        assert!(Signature::from_slice(&[0u8; 64]).is_ok());
    }

    #[test]
    fn test_verify_raw() {
        let key = SigningKey::from_seed(&[1u8; 32]);
        let signature = key.sign(b"delete");
        let public = key.verifying_key().to_bytes();

        assert!(verify_raw(&public, b"delete", signature.as_bytes()).is_ok());
        assert!(verify_raw(&public, b"delete", &[0u8; 12]).is_err());
    }
}
