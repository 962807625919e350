//! Canonical signing strings.
//!
//! Storage nodes recompute these byte strings and reject any request whose
//! signature does not cover exactly the same bytes, so each builder here is
//! part of the wire contract.
//!
//! | Operation | Bytes |
//! |---|---|
//! | retrieve / store / delete_all | `method ‖ namespace ("" for 0, "all") ‖ timestamp` |
//! | delete | `"delete" ‖ hashes…` |
//! | expire | `"expire" ‖ "shorten"/"extend"/"" ‖ expiry ‖ hashes…` |
//! | get_expiries | `"get_expiries" ‖ timestamp ‖ hashes…` |
//! | (un)revoke_subaccount | `method ‖ timestamp ‖ raw token bytes…` |
//! | group invite | `"INVITE" ‖ member id ‖ timestamp` |
//! | group info/member change | `"INFO_CHANGE"/"MEMBER_CHANGE" ‖ type ‖ timestamp` |

use crate::account::AccountId;
use crate::namespace::{Namespace, NamespaceSelector};
use skein_crypto::subaccount::SubaccountToken;
use std::collections::BTreeMap;

/// How an `expire` request may move an expiry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExpireMode {
    /// Only move expiries earlier
    Shorten,
    /// Only move expiries later
    Extend,
    /// Set the expiry unconditionally
    #[default]
    Force,
}

impl ExpireMode {
    /// Component inside the signed string.
    #[must_use]
    pub fn signing_component(self) -> &'static str {
        match self {
            Self::Shorten => "shorten",
            Self::Extend => "extend",
            Self::Force => "",
        }
    }
}

fn method_namespace_timestamp(method: &str, namespace: &str, timestamp_ms: u64) -> Vec<u8> {
    format!("{method}{namespace}{timestamp_ms}").into_bytes()
}

/// `retrieve ‖ namespace ‖ timestamp`
#[must_use]
pub fn retrieve_message(namespace: Namespace, timestamp_ms: u64) -> Vec<u8> {
    method_namespace_timestamp("retrieve", &namespace.signing_component(), timestamp_ms)
}

/// `store ‖ namespace ‖ sig_timestamp`
#[must_use]
pub fn store_message(namespace: Namespace, sig_timestamp_ms: u64) -> Vec<u8> {
    method_namespace_timestamp("store", &namespace.signing_component(), sig_timestamp_ms)
}

/// `delete_all ‖ namespace|"all" ‖ timestamp`
#[must_use]
pub fn delete_all_message(selector: NamespaceSelector, timestamp_ms: u64) -> Vec<u8> {
    method_namespace_timestamp("delete_all", &selector.signing_component(), timestamp_ms)
}

/// `delete ‖ hashes…`
#[must_use]
pub fn delete_message(hashes: &[String]) -> Vec<u8> {
    let mut out = b"delete".to_vec();
    for hash in hashes {
        out.extend_from_slice(hash.as_bytes());
    }
    out
}

/// `expire ‖ mode ‖ expiry ‖ hashes…`
#[must_use]
pub fn expire_message(mode: ExpireMode, expiry_ms: u64, hashes: &[String]) -> Vec<u8> {
    let mut out = format!("expire{}{expiry_ms}", mode.signing_component()).into_bytes();
    for hash in hashes {
        out.extend_from_slice(hash.as_bytes());
    }
    out
}

/// `get_expiries ‖ timestamp ‖ hashes…`
#[must_use]
pub fn get_expiries_message(timestamp_ms: u64, hashes: &[String]) -> Vec<u8> {
    let mut out = format!("get_expiries{timestamp_ms}").into_bytes();
    for hash in hashes {
        out.extend_from_slice(hash.as_bytes());
    }
    out
}

/// `method ‖ timestamp ‖ token bytes…` for `revoke_subaccount` / `unrevoke_subaccount`.
#[must_use]
pub fn revoke_subaccount_message(method: &str, timestamp_ms: u64, tokens: &[SubaccountToken]) -> Vec<u8> {
    let mut out = format!("{method}{timestamp_ms}").into_bytes();
    for token in tokens {
        out.extend_from_slice(token.as_bytes());
    }
    out
}

/// `INVITE ‖ member id ‖ timestamp`
#[must_use]
pub fn invite_message(member: &AccountId, timestamp_ms: u64) -> Vec<u8> {
    format!("INVITE{member}{timestamp_ms}").into_bytes()
}

/// `INFO_CHANGE ‖ type ‖ timestamp`
#[must_use]
pub fn info_change_message(change_type: u32, timestamp_ms: u64) -> Vec<u8> {
    format!("INFO_CHANGE{change_type}{timestamp_ms}").into_bytes()
}

/// `MEMBER_CHANGE ‖ type ‖ timestamp`
#[must_use]
pub fn member_change_message(change_type: u32, timestamp_ms: u64) -> Vec<u8> {
    format!("MEMBER_CHANGE{change_type}{timestamp_ms}").into_bytes()
}

/// String a storage node signs when answering an `expire` request.
///
/// `pubkey ‖ expiry ‖ requested… ‖ updated… ‖ (hash ‖ expiry)… for unchanged`,
/// with unchanged entries in hash order.
#[must_use]
pub fn expire_response_message(
    pubkey: &str,
    expiry_ms: u64,
    requested: &[String],
    updated: &[String],
    unchanged: &BTreeMap<String, u64>,
) -> Vec<u8> {
    let mut out = format!("{pubkey}{expiry_ms}").into_bytes();
    for hash in requested.iter().chain(updated) {
        out.extend_from_slice(hash.as_bytes());
    }
    for (hash, expiry) in unchanged {
        out.extend_from_slice(hash.as_bytes());
        out.extend_from_slice(expiry.to_string().as_bytes());
    }
    out
}
