//! Delegated group signing ("subaccounts").
//!
//! A group admin can let a member write to the group swarm without handing
//! over the group's secret key. The admin derives a blinding scalar `k` for
//! the member, publishes the blinded key `T = k·A` (where `A` is the member's
//! Ed25519 key) inside a 36-byte token and signs the token with the group key.
//!
//! The member signs with the scalar `k·a`, which produces an ordinary Ed25519
//! signature that verifies under `T`. A storage node accepts a request when
//! the token carries a valid group signature and the request carries a valid
//! signature under the token's blinded key.
//!
//! ## Layout
//!
//! ```text
//! token     = 0x03 || flags || 0x00 0x00 || T (32 bytes)        36 bytes
//! auth data = token prefix (4) || k (32) || admin_sig(token) (64) 100 bytes
//! ```

use crate::CryptoError;
use crate::hash::keyed_blake2b_512;
use crate::signatures::{Signature, SigningKey, VerifyingKey};
use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Token size: 4-byte prefix plus the 32-byte blinded key.
pub const SUBACCOUNT_TOKEN_SIZE: usize = 36;

/// Serialized auth data size: prefix, blinding scalar and admin signature.
pub const SUBACCOUNT_AUTH_DATA_SIZE: usize = 4 + 32 + 64;

/// Leading byte of every token, matching the group id prefix.
const TOKEN_PREFIX: u8 = 0x03;

/// Domain separator for blinding derivation.
const BLIND_DOMAIN: &[u8] = b"SubaccountBlind";

/// Permissions granted to a subaccount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SubaccountFlags(u8);

impl SubaccountFlags {
    /// Read-only access.
    pub const NONE: Self = Self(0);
    /// May store messages.
    pub const WRITE: Self = Self(0b0000_0001);
    /// May delete messages and shorten expiries.
    pub const DELETE: Self = Self(0b0000_0010);

    /// Raw flag byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Flags from a raw byte. Unknown bits are kept.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// The public 36-byte subaccount token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubaccountToken([u8; SUBACCOUNT_TOKEN_SIZE]);

impl SubaccountToken {
    /// Parse a token.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] for a wrong-sized slice and
    /// [`CryptoError::InvalidMessage`] for a bad prefix byte.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let token: [u8; SUBACCOUNT_TOKEN_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: SUBACCOUNT_TOKEN_SIZE,
                actual: bytes.len(),
            })?;
        if token[0] != TOKEN_PREFIX {
            return Err(CryptoError::InvalidMessage(format!(
                "subaccount token prefix {:#04x}",
                token[0]
            )));
        }
        Ok(Self(token))
    }

    /// Raw token bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SUBACCOUNT_TOKEN_SIZE] {
        &self.0
    }

    /// Permission flags embedded in the token.
    #[must_use]
    pub fn flags(&self) -> SubaccountFlags {
        SubaccountFlags(self.0[1])
    }

    /// The blinded Ed25519 key `T`.
    #[must_use]
    pub fn blinded_key(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.0[4..]);
        key
    }

    /// Lowercase hex form, as sent in revocation lists.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Member-held subaccount credentials.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SubaccountAuthData {
    #[zeroize(skip)]
    token: SubaccountToken,
    blinding: Scalar,
    #[zeroize(skip)]
    admin_signature: Signature,
}

impl std::fmt::Debug for SubaccountAuthData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubaccountAuthData")
            .field("token", &self.token.to_hex())
            .finish_non_exhaustive()
    }
}

impl SubaccountAuthData {
    /// Issue credentials for `member` (admin side).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the member key is not a
    /// valid curve point.
    pub fn issue(
        admin: &SigningKey,
        member: &VerifyingKey,
        flags: SubaccountFlags,
    ) -> Result<Self, CryptoError> {
        let group_pk = admin.verifying_key().to_bytes();
        let member_pk = member.to_bytes();

        let mut seed = admin.to_seed();
        let wide = keyed_blake2b_512(&seed, &[BLIND_DOMAIN, &member_pk, &group_pk]);
        seed.zeroize();
        let blinding = Scalar::from_bytes_mod_order_wide(&wide?);

        let member_point = CompressedEdwardsY(member_pk)
            .decompress()
            .ok_or(CryptoError::InvalidPublicKey)?;
        let blinded = (blinding * member_point).compress().to_bytes();

        let mut token = [0u8; SUBACCOUNT_TOKEN_SIZE];
        token[0] = TOKEN_PREFIX;
        token[1] = flags.bits();
        token[4..].copy_from_slice(&blinded);
        let token = SubaccountToken(token);
        let admin_signature = admin.sign(token.as_bytes());

        Ok(Self {
            token,
            blinding,
            admin_signature,
        })
    }

    /// Parse serialized credentials.
    ///
    /// The blinded key is not stored; it is recomputed from `member` so a
    /// stored blob cannot be paired with the wrong member key.
    ///
    /// # Errors
    ///
    /// Fails on a wrong length, bad prefix, non-canonical scalar or invalid
    /// member key.
    pub fn from_bytes(bytes: &[u8], member: &VerifyingKey) -> Result<Self, CryptoError> {
        if bytes.len() != SUBACCOUNT_AUTH_DATA_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SUBACCOUNT_AUTH_DATA_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0] != TOKEN_PREFIX {
            return Err(CryptoError::InvalidMessage("subaccount auth prefix".into()));
        }
        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&bytes[4..36]);
        let blinding = Option::<Scalar>::from(Scalar::from_canonical_bytes(scalar_bytes))
            .ok_or_else(|| CryptoError::InvalidMessage("non-canonical blinding scalar".into()))?;
        scalar_bytes.zeroize();

        let member_point = CompressedEdwardsY(member.to_bytes())
            .decompress()
            .ok_or(CryptoError::InvalidPublicKey)?;
        let mut token = [0u8; SUBACCOUNT_TOKEN_SIZE];
        token[..4].copy_from_slice(&bytes[..4]);
        token[4..].copy_from_slice(&(blinding * member_point).compress().to_bytes());

        Ok(Self {
            token: SubaccountToken(token),
            blinding,
            admin_signature: Signature::from_slice(&bytes[36..])?,
        })
    }

    /// Serialize as `prefix || k || admin_sig`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SUBACCOUNT_AUTH_DATA_SIZE] {
        let mut out = [0u8; SUBACCOUNT_AUTH_DATA_SIZE];
        out[..4].copy_from_slice(&self.token.as_bytes()[..4]);
        out[4..36].copy_from_slice(self.blinding.as_bytes());
        out[36..].copy_from_slice(self.admin_signature.as_bytes());
        out
    }

    /// The public token.
    #[must_use]
    pub fn token(&self) -> &SubaccountToken {
        &self.token
    }

    /// Permission flags.
    #[must_use]
    pub fn flags(&self) -> SubaccountFlags {
        self.token.flags()
    }

    /// Admin signature over the token.
    #[must_use]
    pub fn admin_signature(&self) -> &Signature {
        &self.admin_signature
    }

    /// Sign `message` as the subaccount (member side).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeypairMismatch`] if `member` is not the key
    /// these credentials were issued for.
    pub fn sign(&self, member: &SigningKey, message: &[u8]) -> Result<Signature, CryptoError> {
        let expanded = member.expanded();
        let secret = self.blinding * expanded.scalar;
        let blinded_public = (&secret * ED25519_BASEPOINT_TABLE).compress().to_bytes();
        if blinded_public != self.token.blinded_key() {
            return Err(CryptoError::KeypairMismatch);
        }

        let nonce_wide: [u8; 64] = Sha512::new()
            .chain_update(expanded.prefix)
            .chain_update(self.blinding.as_bytes())
            .chain_update(message)
            .finalize()
            .into();
        let r = Scalar::from_bytes_mod_order_wide(&nonce_wide);
        let big_r = (&r * ED25519_BASEPOINT_TABLE).compress().to_bytes();

        let challenge_wide: [u8; 64] = Sha512::new()
            .chain_update(big_r)
            .chain_update(blinded_public)
            .chain_update(message)
            .finalize()
            .into();
        let h = Scalar::from_bytes_mod_order_wide(&challenge_wide);
        let s = r + h * secret;

        let mut signature = [0u8; 64];
        signature[..32].copy_from_slice(&big_r);
        signature[32..].copy_from_slice(s.as_bytes());
        Ok(Signature::from_bytes(signature))
    }
}

/// Verify a subaccount-signed message the way a storage node does.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidSignature`] if the token was not signed by
/// `group`, or the message signature does not verify under the blinded key.
pub fn verify_subaccount_signature(
    group: &VerifyingKey,
    token: &SubaccountToken,
    token_signature: &Signature,
    message: &[u8],
    signature: &Signature,
) -> Result<(), CryptoError> {
    group.verify(token.as_bytes(), token_signature)?;
    let blinded = VerifyingKey::from_bytes(&token.blinded_key())?;
    blinded.verify(message, signature)
}
