//! Onion layer sealing.
//!
//! Each layer is sealed for one hop:
//!
//! 1. A fresh ephemeral X25519 key agrees a shared secret with the hop's
//!    published X25519 key.
//! 2. The symmetric key is `HMAC-SHA256(key = "LOKI", msg = shared_secret)`.
//! 3. The payload is sealed with AES-256-GCM under a random 12-byte IV.
//!    The wire layout is `iv || ciphertext || tag`.
//!
//! The innermost layer's symmetric key is kept by the caller: the destination
//! encrypts its reply with it, and only the originator can open that reply.

use crate::CryptoError;
use crate::random::random_array;
use crate::x25519::{PrivateKey, PublicKey};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce, aead::Aead};
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Key-derivation salt shared by every hop.
const LAYER_KDF_KEY: &[u8] = b"LOKI";

/// AES-GCM tag size.
const GCM_TAG_SIZE: usize = 16;

/// Symmetric key for one onion layer. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LayerKey([u8; 32]);

impl std::fmt::Debug for LayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LayerKey(..)")
    }
}

impl LayerKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Result of sealing one layer.
#[derive(Debug)]
pub struct LayerCiphertext {
    /// `iv || ciphertext || tag`
    pub ciphertext: Vec<u8>,
    /// Ephemeral public key the hop needs to derive the same key
    pub ephemeral_public: PublicKey,
    /// Symmetric key used for this layer
    pub symmetric_key: LayerKey,
}

/// Derive the symmetric layer key from a local private key and a peer public key.
///
/// Both the sender (ephemeral secret, hop public) and the hop (hop secret,
/// ephemeral public) arrive at the same key.
///
/// # Errors
///
/// Returns [`CryptoError::LowOrderPoint`] for a non-contributory exchange.
pub fn derive_symmetric_key(private: &PrivateKey, peer: &PublicKey) -> Result<LayerKey, CryptoError> {
    let shared = private.exchange(peer)?;
    let mut mac = <HmacSha256 as Mac>::new_from_slice(LAYER_KDF_KEY)
        .map_err(|e| CryptoError::InvalidMessage(e.to_string()))?;
    mac.update(shared.as_bytes());
    Ok(LayerKey(mac.finalize().into_bytes().into()))
}

/// Seal `plaintext` for the holder of `destination`'s X25519 secret.
///
/// # Errors
///
/// Fails on a low-order destination key, RNG failure or cipher failure.
pub fn encrypt_for(destination: &PublicKey, plaintext: &[u8]) -> Result<LayerCiphertext, CryptoError> {
    let ephemeral = PrivateKey::generate(&mut OsRng);
    let symmetric_key = derive_symmetric_key(&ephemeral, destination)?;
    let ciphertext = encrypt_with(&symmetric_key, plaintext)?;
    Ok(LayerCiphertext {
        ciphertext,
        ephemeral_public: ephemeral.public_key(),
        symmetric_key,
    })
}

/// Seal `plaintext` under an already-derived layer key.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] or [`CryptoError::EncryptionFailed`].
pub fn encrypt_with(key: &LayerKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(&key.0).map_err(|_| CryptoError::EncryptionFailed)?;
    let iv: [u8; crate::ONION_IV_SIZE] = random_array()?;
    let sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(iv.len() + sealed.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open `iv || ciphertext || tag` under a layer key.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] for short input or a bad tag.
pub fn decrypt_with(key: &LayerKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < crate::ONION_IV_SIZE + GCM_TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    let (iv, sealed) = data.split_at(crate::ONION_IV_SIZE);
    let cipher = Aes256Gcm::new_from_slice(&key.0).map_err(|_| CryptoError::DecryptionFailed)?;
    cipher
        .decrypt(Nonce::from_slice(iv), sealed)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Hop-side open: derive the layer key from the hop's secret and the sender's
/// ephemeral key, then decrypt.
///
/// # Errors
///
/// Fails on a low-order ephemeral key or authentication failure.
pub fn decrypt_from(
    hop_secret: &PrivateKey,
    ephemeral_public: &PublicKey,
    data: &[u8],
) -> Result<(Vec<u8>, LayerKey), CryptoError> {
    let key = derive_symmetric_key(hop_secret, ephemeral_public)?;
    let plaintext = decrypt_with(&key, data)?;
    Ok((plaintext, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_roundtrip_hop_side() {
        let hop = PrivateKey::generate(&mut OsRng);
        let sealed = encrypt_for(&hop.public_key(), b"{\"method\":\"info\"}").unwrap();

        let (plaintext, key) = decrypt_from(&hop, &sealed.ephemeral_public, &sealed.ciphertext).unwrap();
        assert_eq!(plaintext, b"{\"method\":\"info\"}");
        assert_eq!(key.as_bytes(), sealed.symmetric_key.as_bytes());
    }

    #[test]
    fn test_reply_under_layer_key() {
        let hop = PrivateKey::generate(&mut OsRng);
        let sealed = encrypt_for(&hop.public_key(), b"request").unwrap();
        let (_, hop_key) = decrypt_from(&hop, &sealed.ephemeral_public, &sealed.ciphertext).unwrap();

        let reply = encrypt_with(&hop_key, b"response").unwrap();
        assert_eq!(decrypt_with(&sealed.symmetric_key, &reply).unwrap(), b"response");
    }

    #[test]
    fn test_wire_layout_length() {
        let hop = PrivateKey::generate(&mut OsRng);
        let sealed = encrypt_for(&hop.public_key(), &[0u8; 10]).unwrap();
        assert_eq!(sealed.ciphertext.len(), crate::ONION_IV_SIZE + 10 + GCM_TAG_SIZE);
    }

    #[test]
    fn test_tampered_layer_fails() {
        let key = LayerKey::from_bytes([4u8; 32]);
        let mut data = encrypt_with(&key, b"payload").unwrap();
        let last = data.len() - 1;
        data[last] ^= 1;
        assert_eq!(decrypt_with(&key, &data), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_short_input_fails() {
        let key = LayerKey::from_bytes([4u8; 32]);
        assert!(decrypt_with(&key, &[0u8; 20]).is_err());
    }

    #[test]
    fn test_wrong_hop_cannot_open() {
        let hop = PrivateKey::generate(&mut OsRng);
        let other = PrivateKey::generate(&mut OsRng);
        let sealed = encrypt_for(&hop.public_key(), b"secret").unwrap();
        assert!(decrypt_from(&other, &sealed.ephemeral_public, &sealed.ciphertext).is_err());
    }
}
