//! Fuzz target for the inbound frame decoder
//!
//! Feeds arbitrary text to `decode` to find:
//! - Panics on unexpected JSON shapes (wrong field types, nested ids)
//! - Numeric codes or ids that fail to coerce
//!
//! The decoder should NEVER panic. Invalid input must return an error, and
//! anything that decodes must report a known event kind.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(frame) = lawbuddy_proto::decode(text) {
        assert!(!frame.kind().is_empty());
    }
});
