//! # Skein Crypto
//!
//! Cryptographic primitives for the Skein swarm client.
//!
//! This crate provides:
//! - Ed25519 signing and verification for request authentication
//! - X25519 key exchange for onion layer encryption
//! - Onion layer sealing (HMAC-SHA256 key derivation + AES-256-GCM)
//! - `XChaCha20-Poly1305` for name-service value decryption
//! - BLAKE2b hashing (plain and keyed)
//! - Blinded subaccount signing for delegated group access
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Request Signatures | Ed25519 | 128-bit |
//! | Layer Key Exchange | X25519 | 128-bit |
//! | Layer Key Derivation | HMAC-SHA256 | 256-bit |
//! | Layer AEAD | AES-256-GCM | 256-bit key |
//! | Name Value AEAD | XChaCha20-Poly1305 | 256-bit key |
//! | Hash | BLAKE2b-256 | 128-bit collision |
//! | Subaccount Blinding | Ed25519 scalar arithmetic | 128-bit |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod error;
pub mod hash;
pub mod onion;
pub mod random;
pub mod signatures;
pub mod subaccount;
pub mod x25519;

pub use error::CryptoError;

/// X25519 public key size
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// X25519 secret key size
pub const X25519_SECRET_KEY_SIZE: usize = 32;

/// Ed25519 public key size
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 seed size
pub const ED25519_SEED_SIZE: usize = 32;

/// Ed25519 expanded keypair size (seed followed by public key)
pub const ED25519_KEYPAIR_SIZE: usize = 64;

/// Ed25519 signature size
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// AES-GCM IV size used by onion layers
pub const ONION_IV_SIZE: usize = 12;

/// BLAKE2b output size used throughout
pub const BLAKE2B_OUTPUT_SIZE: usize = 32;
