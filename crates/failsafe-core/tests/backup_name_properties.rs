//! Property-based round-trip test for backup filenames.
//!
//! For every name the synthesizer can produce, the restore parser must
//! recover the storage kind, target, and range exactly. Target names are
//! drawn without `_` (underscores in a target are ambiguous against the
//! model separator by construction; real partition names use `-`).

use failsafe_core::backup::{backup_filename, parse_backup_filename};
use proptest::prelude::*;

fn storage_kind() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("mtd"), Just("mmc")]
}

/// Arbitrary model strings, including characters the sanitizer rewrites.
fn model() -> impl Strategy<Value = String> {
    "[ -~]{0,24}"
}

/// Target names as they appear on real boards: no underscore.
fn target() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9.-]{1,24}"
}

proptest! {
    #[test]
    fn synthesized_names_parse_back_exactly(
        kind in storage_kind(),
        model in model(),
        target in target(),
        start in any::<u32>(),
        span in 1u32..u32::MAX,
    ) {
        let start = u64::from(start);
        let end = start + u64::from(span);

        let name = backup_filename(kind, &model, &target, start, end);
        let parsed = parse_backup_filename(&name)
            .ok_or_else(|| TestCaseError::fail(format!("unparseable: {name}")))?;

        prop_assert_eq!(parsed.storage, kind);
        prop_assert_eq!(parsed.target, target);
        prop_assert_eq!(parsed.start, start);
        prop_assert_eq!(parsed.end, end);
    }
}
