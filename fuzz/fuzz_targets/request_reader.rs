//! Fuzz target for the HTTP request reader.
//!
//! Arbitrary socket bytes, arbitrarily chunked, must never panic the
//! reader; every malformed input must surface as an error.

#![no_main]

use failsafe_http::{Progress, ReadLimits, RequestReader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (Vec<Vec<u8>>, u8)| {
    let (chunks, _seed) = input;
    let mut reader = RequestReader::new(ReadLimits { max_head: 4096, max_body: 64 * 1024 });

    for chunk in chunks {
        match reader.feed(&chunk) {
            Ok(Progress::Complete) => {
                let _ = reader.into_request();
                return;
            },
            Ok(Progress::NeedMore) => {},
            Err(_) => return,
        }
    }
});
