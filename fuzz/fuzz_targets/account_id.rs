//! Fuzz target for account id parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use skein_core::AccountId;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(id) = AccountId::parse(s) {
            let _ = id.ensure_swarm_target();
        }
    }
});
