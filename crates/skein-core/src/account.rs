//! Account identifiers.
//!
//! An account id is 33 bytes shown as 66 lowercase hex characters: a one-byte
//! prefix naming the id kind followed by a 32-byte key.

use crate::error::{RequestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account id prefix byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AccountPrefix {
    /// Closed group (key is the group's Ed25519 key)
    Group = 0x03,
    /// Standard user (key is the X25519 form of the user's Ed25519 key)
    Standard = 0x05,
    /// Blinded id used by community servers
    Blinded15 = 0x15,
    /// Blinded id, second scheme
    Blinded25 = 0x25,
}

impl AccountPrefix {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x03 => Some(Self::Group),
            0x05 => Some(Self::Standard),
            0x15 => Some(Self::Blinded15),
            0x25 => Some(Self::Blinded25),
            _ => None,
        }
    }

    /// Whether this is one of the blinded id kinds.
    #[must_use]
    pub fn is_blinded(self) -> bool {
        matches!(self, Self::Blinded15 | Self::Blinded25)
    }
}

/// A prefixed account id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId {
    prefix: AccountPrefix,
    key: [u8; 32],
}

impl AccountId {
    /// Build from parts.
    #[must_use]
    pub fn new(prefix: AccountPrefix, key: [u8; 32]) -> Self {
        Self { prefix, key }
    }

    /// Parse a 66-character hex id.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidAccountId`] for bad length, bad hex or an
    /// unknown prefix.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != 66 {
            return Err(RequestError::InvalidAccountId(
                format!("expected 66 hex characters, got {}", s.len()).into(),
            ));
        }
        let bytes = hex::decode(s).map_err(|e| RequestError::InvalidAccountId(e.to_string().into()))?;
        let prefix = AccountPrefix::from_byte(bytes[0]).ok_or_else(|| {
            RequestError::InvalidAccountId(format!("unknown prefix {:02x}", bytes[0]).into())
        })?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[1..]);
        Ok(Self { prefix, key })
    }

    /// Id prefix.
    #[must_use]
    pub fn prefix(&self) -> AccountPrefix {
        self.prefix
    }

    /// The 32-byte key without prefix.
    #[must_use]
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Whether this is a closed group id.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.prefix == AccountPrefix::Group
    }

    /// The 33 raw bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = self.prefix as u8;
        out[1..].copy_from_slice(&self.key);
        out
    }

    /// Reject ids that cannot own a swarm.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Precondition`] for blinded ids.
    pub fn ensure_swarm_target(&self) -> Result<()> {
        if self.prefix.is_blinded() {
            return Err(RequestError::precondition(
                "blinded ids have no swarm; use the unblinded account id",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({self})")
    }
}

impl FromStr for AccountId {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountId {
    type Error = RequestError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.to_string()
    }
}
