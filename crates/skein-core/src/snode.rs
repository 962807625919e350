//! Storage node identities and onion paths.

use crate::error::{RequestError, Result};
use serde::Deserialize;
use serde_json::Value;
use skein_crypto::signatures::VerifyingKey;
use skein_crypto::x25519::PublicKey;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// A storage node: address plus its two published keys.
///
/// Identity (equality and hashing) is the Ed25519 key alone.
#[derive(Clone)]
pub struct Snode {
    /// Node IP address
    pub ip: IpAddr,
    /// HTTPS port
    pub port: u16,
    /// X25519 key used to seal onion layers for this node
    pub pubkey_x25519: [u8; 32],
    /// Ed25519 identity key; signs node responses
    pub pubkey_ed25519: [u8; 32],
}

impl Snode {
    /// Create a node record.
    #[must_use]
    pub fn new(ip: IpAddr, port: u16, pubkey_x25519: [u8; 32], pubkey_ed25519: [u8; 32]) -> Self {
        Self {
            ip,
            port,
            pubkey_x25519,
            pubkey_ed25519,
        }
    }

    /// Ed25519 key as lowercase hex.
    #[must_use]
    pub fn ed25519_hex(&self) -> String {
        hex::encode(self.pubkey_ed25519)
    }

    /// Socket address of the node's HTTPS listener.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// X25519 key for onion layer sealing.
    #[must_use]
    pub fn x25519_public(&self) -> PublicKey {
        PublicKey::from_bytes(self.pubkey_x25519)
    }

    /// Ed25519 key for response signature checks.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if the published key is not a valid point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        Ok(VerifyingKey::from_bytes(&self.pubkey_ed25519)?)
    }

    /// Parse one node record as published by `get_swarm`.
    ///
    /// Returns `None` for unroutable records (`0.0.0.0`) and malformed keys.
    #[must_use]
    pub fn from_record(record: &SnodeRecord) -> Option<Self> {
        let ip: IpAddr = record.ip.parse().ok()?;
        if ip == IpAddr::V4(Ipv4Addr::UNSPECIFIED) {
            return None;
        }
        Some(Self {
            ip,
            port: record.port_https,
            pubkey_x25519: decode_key(&record.pubkey_x25519)?,
            pubkey_ed25519: decode_key(&record.pubkey_ed25519)?,
        })
    }
}

fn decode_key(hex_str: &str) -> Option<[u8; 32]> {
    hex::decode(hex_str).ok()?.try_into().ok()
}

impl PartialEq for Snode {
    fn eq(&self, other: &Self) -> bool {
        self.pubkey_ed25519 == other.pubkey_ed25519
    }
}

impl Eq for Snode {}

impl Hash for Snode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pubkey_ed25519.hash(state);
    }
}

impl fmt::Debug for Snode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Snode({}:{} {}..)", self.ip, self.port, &self.ed25519_hex()[..8])
    }
}

/// Wire form of a node record.
#[derive(Debug, Clone, Deserialize)]
pub struct SnodeRecord {
    /// IP address as text
    pub ip: String,
    /// HTTPS port
    pub port_https: u16,
    /// Ed25519 key, hex
    pub pubkey_ed25519: String,
    /// X25519 key, hex
    pub pubkey_x25519: String,
}

/// Parse the `snodes` array of a swarm response body.
///
/// Malformed and unroutable entries are skipped; a missing array yields an
/// empty list.
#[must_use]
pub fn parse_snodes(body: &Value) -> Vec<Snode> {
    let Some(entries) = body.get("snodes").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<SnodeRecord>(entry.clone()).ok())
        .filter_map(|record| Snode::from_record(&record))
        .collect()
}

/// An ordered onion path: guard first, last relay last.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OnionPath {
    hops: Vec<Snode>,
}

impl OnionPath {
    /// Build a path.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Precondition`] for an empty path or a path
    /// visiting the same node twice.
    pub fn new(hops: Vec<Snode>) -> Result<Self> {
        if hops.is_empty() {
            return Err(RequestError::precondition("onion path has no hops"));
        }
        for (i, hop) in hops.iter().enumerate() {
            if hops[..i].contains(hop) {
                return Err(RequestError::precondition("onion path repeats a node"));
            }
        }
        Ok(Self { hops })
    }

    /// Hops from guard to last relay.
    #[must_use]
    pub fn hops(&self) -> &[Snode] {
        &self.hops
    }

    /// The guard (first) node.
    #[must_use]
    pub fn guard(&self) -> &Snode {
        &self.hops[0]
    }

    /// Number of hops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Always false; a path has at least one hop.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Whether the path routes through the node with this Ed25519 key.
    #[must_use]
    pub fn contains(&self, pubkey_ed25519: &[u8; 32]) -> bool {
        self.hops.iter().any(|hop| &hop.pubkey_ed25519 == pubkey_ed25519)
    }

    /// Stable identifier for health bookkeeping.
    #[must_use]
    pub fn id(&self) -> String {
        self.hops
            .iter()
            .map(|hop| hop.ed25519_hex()[..16].to_string())
            .collect::<Vec<_>>()
            .join(">")
    }
}

impl fmt::Debug for OnionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OnionPath({})", self.id())
    }
}
