//! Fuzz target for swarm response bodies
//!
//! Node lists and signed expire results come from untrusted nodes; parsing
//! and reconciling them must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use skein_core::snode::parse_snodes;
use skein_swarm::reconcile_expire_response;
use std::collections::BTreeMap;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let members = parse_snodes(&body);

    let requested = vec!["aa".to_string(), "bb".to_string()];
    let mut merged = BTreeMap::new();
    let _ = reconcile_expire_response("05aa", &requested, &body, &members, &mut merged, 1_700_000_000_000);
});
