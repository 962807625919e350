//! Fuzz target for guard reply handling
//!
//! Arbitrary guard statuses and bodies, including hop error texts and
//! undecryptable payloads, must map to a response or an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use skein_core::{OnionPath, Snode};
use skein_crypto::onion::LayerKey;
use skein_transport::onion::decode_ciphertext_plus_json;
use skein_transport::response::process_guard_reply;
use std::net::{IpAddr, Ipv4Addr};

fuzz_target!(|data: &[u8]| {
    let _ = decode_ciphertext_plus_json(data);

    if data.len() < 2 {
        return;
    }
    let status = u16::from_le_bytes([data[0], data[1]]);
    let guard = Snode::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 22021, [1; 32], [2; 32]);
    let Ok(path) = OnionPath::new(vec![guard]) else {
        return;
    };
    let key = LayerKey::from_bytes([7; 32]);
    let _ = process_guard_reply(status, &data[2..], &path, &key);
});
