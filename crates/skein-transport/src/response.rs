//! Guard reply processing.
//!
//! A 200 from the guard carries the destination's reply sealed under the
//! destination layer key; anything else is the path's own error. Honest
//! non-2xx destination responses pass through untouched, except 406 (clock
//! skew), which no retry can fix.

use crate::error::{TransportError, TransportResult};
use crate::v4::{V4Body, decode_v4};
use serde_json::Value;
use skein_core::snode::OnionPath;
use skein_crypto::onion::{LayerKey, decrypt_with};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Prefix of the guard error naming a missing next hop.
const NEXT_NODE_NOT_FOUND: &str = "Next node not found: ";

/// Prefix of the guard error naming an unreachable next hop.
const NEXT_NODE_UNREACHABLE: &str = "Next node is currently unreachable: ";

/// Status a destination returns when our clock is off.
pub const CLOCK_OUT_OF_SYNC: u16 = 406;

/// Decrypted, decoded reply from the final destination.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationResponse {
    /// Destination status code
    pub status: u16,
    /// Destination headers
    pub headers: BTreeMap<String, String>,
    /// Classified body
    pub body: V4Body,
}

impl DestinationResponse {
    /// JSON body, if the reply was JSON.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            V4Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the destination answered 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Ed25519 key named by a guard's next-hop error, if the text is one.
fn hop_named_in(text: &str) -> Option<[u8; 32]> {
    let rest = text
        .strip_prefix(NEXT_NODE_NOT_FOUND)
        .or_else(|| text.strip_prefix(NEXT_NODE_UNREACHABLE))?;
    hex::decode(rest.trim()).ok()?.try_into().ok()
}

/// Turn a guard HTTP reply into a destination response or a classified error.
///
/// # Errors
///
/// - [`TransportError::HopFailure`] when the guard names a failed hop
/// - [`TransportError::PathFailure`] for other guard errors and replies that
///   do not open under the destination key
/// - [`TransportError::Decode`] for an opened reply that is not valid V4
/// - [`TransportError::ClockOutOfSync`] for a 406 from either side
pub fn process_guard_reply(
    status: u16,
    body: &[u8],
    path: &OnionPath,
    destination_key: &LayerKey,
) -> TransportResult<DestinationResponse> {
    if status == CLOCK_OUT_OF_SYNC {
        return Err(TransportError::ClockOutOfSync);
    }
    if status != 200 {
        let text = String::from_utf8_lossy(body);
        if let Some(ed25519) = hop_named_in(&text) {
            warn!(path = ?path, hop = %hex::encode(&ed25519[..4]), "guard reports failed hop");
            return Err(TransportError::HopFailure {
                ed25519,
                reason: text.into_owned(),
            });
        }
        debug!(path = ?path, status, "guard returned error");
        return Err(TransportError::PathFailure(format!("guard status {status}: {text}")));
    }

    let plaintext = decrypt_with(destination_key, body)
        .map_err(|_| TransportError::PathFailure("reply did not open under the destination key".into()))?;
    let decoded =
        decode_v4(&plaintext).ok_or_else(|| TransportError::Decode("malformed V4 reply".into()))?;

    if decoded.code == CLOCK_OUT_OF_SYNC {
        return Err(TransportError::ClockOutOfSync);
    }
    Ok(DestinationResponse {
        status: decoded.code,
        headers: decoded.headers,
        body: decoded.body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v4::encode_v4;
    use serde_json::json;
    use skein_core::snode::Snode;
    use skein_crypto::onion::encrypt_with;
    use std::net::{IpAddr, Ipv4Addr};

    fn path() -> OnionPath {
        let node = Snode::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1, [1; 32], [1; 32]);
        OnionPath::new(vec![node]).unwrap()
    }

    fn key() -> LayerKey {
        LayerKey::from_bytes([5; 32])
    }

    #[test]
    fn test_success_reply() {
        let reply = encode_v4(
            &json!({"code": 200, "headers": {"content-type": "application/json"}}),
            Some(br#"{"results":[]}"#),
        );
        let sealed = encrypt_with(&key(), &reply).unwrap();
        let response = process_guard_reply(200, &sealed, &path(), &key()).unwrap();
        assert!(response.is_success());
        assert_eq!(response.json().unwrap()["results"], json!([]));
    }

    #[test]
    fn test_destination_error_passes_through() {
        let reply = encode_v4(
            &json!({"code": 421, "headers": {"content-type": "application/json"}}),
            Some(br#"{"snodes":[]}"#),
        );
        let sealed = encrypt_with(&key(), &reply).unwrap();
        let response = process_guard_reply(200, &sealed, &path(), &key()).unwrap();
        assert_eq!(response.status, 421);
        assert!(!response.is_success());
    }

    #[test]
    fn test_next_node_not_found_names_hop() {
        let body = format!("Next node not found: {}", hex::encode([0xcd; 32]));
        let err = process_guard_reply(502, body.as_bytes(), &path(), &key()).unwrap_err();
        assert_eq!(err.implicated_node(), Some([0xcd; 32]));
    }

    #[test]
    fn test_other_guard_errors_are_path_failures() {
        let err = process_guard_reply(502, b"Bad gateway", &path(), &key()).unwrap_err();
        assert!(matches!(err, TransportError::PathFailure(_)));

        let err = process_guard_reply(200, b"garbage that is not sealed", &path(), &key()).unwrap_err();
        assert!(matches!(err, TransportError::PathFailure(_)));
    }

    #[test]
    fn test_clock_skew() {
        assert_eq!(
            process_guard_reply(406, b"", &path(), &key()).unwrap_err(),
            TransportError::ClockOutOfSync
        );
        let sealed = encrypt_with(&key(), &encode_v4(&json!({"code": 406}), None)).unwrap();
        assert_eq!(
            process_guard_reply(200, &sealed, &path(), &key()).unwrap_err(),
            TransportError::ClockOutOfSync
        );
    }

    #[test]
    fn test_malformed_v4_is_decode_error() {
        let sealed = encrypt_with(&key(), b"l5:e").unwrap();
        assert!(matches!(
            process_guard_reply(200, &sealed, &path(), &key()).unwrap_err(),
            TransportError::Decode(_)
        ));
    }
}
