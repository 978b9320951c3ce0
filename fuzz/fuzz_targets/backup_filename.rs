//! Fuzz target for the backup filename parser.

#![no_main]

use failsafe_core::backup::parse_backup_filename;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|name: &str| {
    if let Some(parsed) = parse_backup_filename(name) {
        assert!(parsed.start < parsed.end);
        assert!(!parsed.target.is_empty());
    }
});
