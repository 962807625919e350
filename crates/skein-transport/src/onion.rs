//! Onion wrapping.
//!
//! The destination payload is sealed for the destination first, then for each
//! path hop from the last relay back to the guard. Each hop, after opening
//! its layer, finds a blob of the form
//!
//! ```text
//! u32 LE ciphertext length ‖ ciphertext ‖ routing JSON
//! ```
//!
//! where the routing JSON names the next hop (`destination`, an Ed25519 key)
//! or, at the last relay, a server (`host`, `target`, `method`, `protocol`,
//! `port`), plus the `ephemeral_key` needed to open the next layer. The guard
//! receives its own layer as `ciphertext ‖ {"ephemeral_key": …}`.

use crate::error::{TransportError, TransportResult};
use serde_json::{Value, json};
use skein_core::snode::{OnionPath, Snode};
use skein_crypto::onion::{LayerKey, encrypt_for};
use skein_crypto::x25519::PublicKey;
use tracing::trace;

/// A non-node HTTP(S) server reached through the last relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    /// Host name
    pub host: String,
    /// Path on the server, e.g. `/oxen/v4/lsrpc`
    pub target: String,
    /// `https` or `http`
    pub protocol: String,
    /// TCP port
    pub port: u16,
    /// Server's X25519 key
    pub x25519: [u8; 32],
}

/// Final destination of an onion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A storage node
    Snode(Snode),
    /// An HTTP(S) server
    Server(ServerTarget),
}

impl Destination {
    fn x25519(&self) -> PublicKey {
        match self {
            Self::Snode(node) => node.x25519_public(),
            Self::Server(server) => PublicKey::from_bytes(server.x25519),
        }
    }

    /// Routing instructions for the last relay.
    fn routing(&self, ephemeral_key: &str) -> Value {
        match self {
            Self::Snode(node) => json!({
                "destination": node.ed25519_hex(),
                "ephemeral_key": ephemeral_key,
            }),
            Self::Server(server) => json!({
                "host": server.host,
                "target": server.target,
                "method": "POST",
                "protocol": server.protocol,
                "port": server.port,
                "ephemeral_key": ephemeral_key,
            }),
        }
    }
}

/// A wrapped request ready for the guard.
#[derive(Debug)]
pub struct OnionPacket {
    /// Bytes to POST to the guard
    pub guard_payload: Vec<u8>,
    /// Key the destination uses for its reply
    pub destination_key: LayerKey,
}

/// `u32 LE length ‖ ciphertext ‖ json`
///
/// # Errors
///
/// Returns [`TransportError::InvalidPath`] for ciphertexts over 4 GiB.
pub fn encode_ciphertext_plus_json(ciphertext: &[u8], routing: &Value) -> TransportResult<Vec<u8>> {
    let len = u32::try_from(ciphertext.len())
        .map_err(|_| TransportError::InvalidPath("layer ciphertext too large".into()))?;
    let routing = routing.to_string();
    let mut out = Vec::with_capacity(4 + ciphertext.len() + routing.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(ciphertext);
    out.extend_from_slice(routing.as_bytes());
    Ok(out)
}

/// Inverse of [`encode_ciphertext_plus_json`]; `None` if malformed.
#[must_use]
pub fn decode_ciphertext_plus_json(blob: &[u8]) -> Option<(&[u8], Value)> {
    let len_bytes: [u8; 4] = blob.get(..4)?.try_into().ok()?;
    let len = usize::try_from(u32::from_le_bytes(len_bytes)).ok()?;
    let end = 4usize.checked_add(len)?;
    let ciphertext = blob.get(4..end)?;
    let routing = serde_json::from_slice(blob.get(end..)?).ok()?;
    Some((ciphertext, routing))
}

/// Seal `payload` for `destination` and wrap it through every hop of `path`.
///
/// # Errors
///
/// Returns [`TransportError::InvalidPath`] if the destination is itself a
/// path hop, or a crypto error if sealing fails.
pub fn wrap_onion(path: &OnionPath, destination: &Destination, payload: &[u8]) -> TransportResult<OnionPacket> {
    if let Destination::Snode(node) = destination {
        if path.contains(&node.pubkey_ed25519) {
            return Err(TransportError::InvalidPath(
                "destination node is part of the path".into(),
            ));
        }
    }

    let sealed = encrypt_for(&destination.x25519(), payload)?;
    let destination_key = sealed.symmetric_key;
    let mut ciphertext = sealed.ciphertext;
    let mut ephemeral = hex::encode(sealed.ephemeral_public.to_bytes());
    let mut routing = destination.routing(&ephemeral);

    for hop in path.hops().iter().rev() {
        let blob = encode_ciphertext_plus_json(&ciphertext, &routing)?;
        let layer = encrypt_for(&hop.x25519_public(), &blob)?;
        trace!(hop = ?hop, size = layer.ciphertext.len(), "sealed onion layer");

        ciphertext = layer.ciphertext;
        ephemeral = hex::encode(layer.ephemeral_public.to_bytes());
        routing = json!({
            "destination": hop.ed25519_hex(),
            "ephemeral_key": ephemeral,
        });
    }

    let guard_payload = encode_ciphertext_plus_json(&ciphertext, &json!({ "ephemeral_key": ephemeral }))?;
    Ok(OnionPacket {
        guard_payload,
        destination_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_crypto::onion::decrypt_from;
    use skein_crypto::x25519::PrivateKey;
    use std::net::{IpAddr, Ipv4Addr};

    fn node(n: u8) -> (Snode, PrivateKey) {
        let secret = PrivateKey::from_bytes([n; 32]);
        let node = Snode::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)),
            443,
            secret.public_key().to_bytes(),
            [n; 32],
        );
        (node, secret)
    }

    fn peel(secret: &PrivateKey, ciphertext: &[u8], ephemeral_hex: &str) -> (Vec<u8>, LayerKey) {
        let ephemeral = PublicKey::from_slice(&hex::decode(ephemeral_hex).unwrap()).unwrap();
        decrypt_from(secret, &ephemeral, ciphertext).unwrap()
    }

    #[test]
    fn test_ciphertext_plus_json_roundtrip() {
        let blob = encode_ciphertext_plus_json(b"abc", &json!({"k": 1})).unwrap();
        assert_eq!(&blob[..4], &3u32.to_le_bytes());
        let (ciphertext, routing) = decode_ciphertext_plus_json(&blob).unwrap();
        assert_eq!(ciphertext, b"abc");
        assert_eq!(routing["k"], 1);
        assert!(decode_ciphertext_plus_json(&[9, 0, 0, 0, 1]).is_none());
    }

    #[test]
    fn test_layers_peel_in_path_order() {
        let hops: Vec<_> = (1..=3).map(node).collect();
        let (dest, dest_secret) = node(9);
        let path = OnionPath::new(hops.iter().map(|(n, _)| n.clone()).collect()).unwrap();

        let packet = wrap_onion(&path, &Destination::Snode(dest.clone()), b"payload").unwrap();

        let (ciphertext, routing) = decode_ciphertext_plus_json(&packet.guard_payload).unwrap();
        let mut ciphertext = ciphertext.to_vec();
        let mut ephemeral = routing["ephemeral_key"].as_str().unwrap().to_string();

        for (i, (_, secret)) in hops.iter().enumerate() {
            let (blob, _) = peel(secret, &ciphertext, &ephemeral);
            let (inner, routing) = decode_ciphertext_plus_json(&blob).unwrap();
            let expected_next = hops.get(i + 1).map_or(dest.ed25519_hex(), |(n, _)| n.ed25519_hex());
            assert_eq!(routing["destination"], expected_next);
            ciphertext = inner.to_vec();
            ephemeral = routing["ephemeral_key"].as_str().unwrap().to_string();
        }

        let (plaintext, key) = peel(&dest_secret, &ciphertext, &ephemeral);
        assert_eq!(plaintext, b"payload");
        assert_eq!(key.as_bytes(), packet.destination_key.as_bytes());
    }

    #[test]
    fn test_server_routing_at_last_relay() {
        let (relay, secret) = node(1);
        let server_secret = PrivateKey::from_bytes([7; 32]);
        let server = ServerTarget {
            host: "open.example.org".into(),
            target: "/oxen/v4/lsrpc".into(),
            protocol: "https".into(),
            port: 443,
            x25519: server_secret.public_key().to_bytes(),
        };
        let path = OnionPath::new(vec![relay]).unwrap();
        let packet = wrap_onion(&path, &Destination::Server(server), b"req").unwrap();

        let (ciphertext, routing) = decode_ciphertext_plus_json(&packet.guard_payload).unwrap();
        let (blob, _) = peel(&secret, ciphertext, routing["ephemeral_key"].as_str().unwrap());
        let (_, routing) = decode_ciphertext_plus_json(&blob).unwrap();
        assert_eq!(routing["host"], "open.example.org");
        assert_eq!(routing["method"], "POST");
        assert_eq!(routing["port"], 443);
        assert!(routing.get("destination").is_none());
    }

    #[test]
    fn test_destination_in_path_rejected() {
        let (a, _) = node(1);
        let path = OnionPath::new(vec![a.clone()]).unwrap();
        assert!(matches!(
            wrap_onion(&path, &Destination::Snode(a), b"x"),
            Err(TransportError::InvalidPath(_))
        ));
    }
}
