//! Fuzz target for the streaming multipart parser.
//!
//! Drives the parser with an arbitrary boundary and body, in arbitrary
//! chunk sizes. Must never panic, and incremental parsing must agree
//! with one-shot parsing.

#![no_main]

use failsafe_http::MultipartParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (String, Vec<u8>, u8)| {
    let (boundary, body, step) = input;
    if boundary.is_empty() || boundary.len() > 70 {
        return;
    }
    let step = usize::from(step).max(1);

    let mut one_shot = MultipartParser::new(&boundary);
    let whole = one_shot.drive(&body).and_then(|()| one_shot.finish());

    let mut incremental = MultipartParser::new(&boundary);
    let mut fed = 0;
    let mut failed = false;
    while fed < body.len() {
        fed = (fed + step).min(body.len());
        if incremental.drive(&body[..fed]).is_err() {
            failed = true;
            break;
        }
    }

    if let Ok(values) = whole {
        assert!(!failed, "incremental parse failed where one-shot succeeded");
        let chunked = incremental.finish().expect("incremental finish");
        assert_eq!(values, chunked);
    }
});
