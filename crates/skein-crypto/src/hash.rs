//! BLAKE2b hashing and the name-service key derivations built on it.
//!
//! Provides:
//! - Plain BLAKE2b-256
//! - Keyed BLAKE2b-256 / BLAKE2b-512 (RFC 7693 keyed mode)
//! - Name hashing and value-key derivation for name resolution

use crate::CryptoError;
use blake2::digest::consts::{U32, U64};
use blake2::digest::{Digest, KeyInit, Mac};
use blake2::{Blake2b, Blake2bMac};

/// BLAKE2b-256 output (32 bytes).
pub type HashOutput = [u8; 32];

type Blake2b256 = Blake2b<U32>;
type Blake2bMac256 = Blake2bMac<U32>;
type Blake2bMac512 = Blake2bMac<U64>;

/// Compute BLAKE2b-256 of the concatenation of `parts`.
#[must_use]
pub fn blake2b_256(parts: &[&[u8]]) -> HashOutput {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Keyed BLAKE2b-256 of the concatenation of `parts`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] for keys longer than 64 bytes.
pub fn keyed_blake2b_256(key: &[u8], parts: &[&[u8]]) -> Result<HashOutput, CryptoError> {
    let mut mac = <Blake2bMac256 as KeyInit>::new_from_slice(key).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: 64,
            actual: key.len(),
        }
    })?;
    for part in parts {
        Mac::update(&mut mac, part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Keyed BLAKE2b-512 of the concatenation of `parts`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] for keys longer than 64 bytes.
pub fn keyed_blake2b_512(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 64], CryptoError> {
    let mut mac = <Blake2bMac512 as KeyInit>::new_from_slice(key).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: 64,
            actual: key.len(),
        }
    })?;
    for part in parts {
        Mac::update(&mut mac, part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Hash of a lowercased name, used as the lookup key for name resolution.
#[must_use]
pub fn ons_name_hash(name: &str) -> HashOutput {
    blake2b_256(&[name.to_lowercase().as_bytes()])
}

/// Key that decrypts a resolved name value.
///
/// Derived from the name alone (keyed by its own hash), so no node-supplied
/// secret is involved.
///
/// # Errors
///
/// Never fails for a 32-byte name hash; the error path exists for key length.
pub fn ons_value_key(name: &str, name_hash: &HashOutput) -> Result<[u8; 32], CryptoError> {
    keyed_blake2b_256(name_hash, &[name.to_lowercase().as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake2b_known_vector() {
        // BLAKE2b-256("abc")
        let expected = "bddd813c634239723171ef3fee98579b94964e3bb1cb3e427262c8c068d52319";
        assert_eq!(hex::encode(blake2b_256(&[b"abc"])), expected);
    }

    #[test]
    fn test_blake2b_parts_concatenate() {
        assert_eq!(blake2b_256(&[b"ab", b"c"]), blake2b_256(&[b"abc"]));
    }

    #[test]
    fn test_keyed_differs_from_plain() {
        let keyed = keyed_blake2b_256(b"key", &[b"abc"]).unwrap();
        assert_ne!(keyed, blake2b_256(&[b"abc"]));
    }

    #[test]
    fn test_keyed_rejects_long_key() {
        assert!(keyed_blake2b_256(&[0u8; 65], &[b"abc"]).is_err());
        assert!(keyed_blake2b_512(&[0u8; 65], &[b"abc"]).is_err());
    }

    #[test]
    fn test_name_hash_is_case_insensitive() {
        assert_eq!(ons_name_hash("Alice"), ons_name_hash("alice"));
        assert_ne!(ons_name_hash("alice"), ons_name_hash("bob"));
    }

    #[test]
    fn test_value_key_depends_on_name() {
        let hash = ons_name_hash("alice");
        let key1 = ons_value_key("alice", &hash).unwrap();
        let key2 = ons_value_key("ALICE", &hash).unwrap();
        assert_eq!(key1, key2);
        assert_ne!(key1, hash);
    }
}
