//! Fuzz test for configuration file parsing
//!
//! Arbitrary TOML must either fail to deserialize or produce a config whose
//! validation returns without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use skein_core::ClientConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<ClientConfig>(s) {
            let _ = config.validate();
        }
    }
});
