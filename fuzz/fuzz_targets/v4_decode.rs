//! Fuzz target for V4 response decoding
//!
//! The decoder must reject malformed framing without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use skein_transport::v4::{decode_v4, decode_v4_parts};

fuzz_target!(|data: &[u8]| {
    let _ = decode_v4_parts(data);
    let _ = decode_v4(data);
});
