//! Fuzz target for compressed RLE strings.
//!
//! Feeds arbitrary strings to the RLE unpacker and, when they unpack,
//! checks that packing the runs again yields a string that unpacks to the
//! same runs.

#![no_main]

use labelspace::rle::{rle_to_string, string_to_rle};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 64 * 1024 {
        return;
    }
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(runs) = string_to_rle(s) {
        let packed = rle_to_string(&runs);
        assert_eq!(string_to_rle(&packed).ok(), Some(runs));
    }
});
