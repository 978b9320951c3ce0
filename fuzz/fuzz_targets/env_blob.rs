//! Fuzz target for env blob import.
//!
//! Arbitrary blobs must either import cleanly or be rejected; an import
//! that succeeds must re-export to an identical variable set.

#![no_main]

use std::collections::BTreeMap;

use failsafe_core::env::EnvStore;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|blob: &[u8]| {
    let mut env = EnvStore::new(BTreeMap::new());
    if env.import_blob(blob).is_ok() {
        let exported = env.export_blob();
        let mut second = EnvStore::new(BTreeMap::new());
        second.import_blob(&exported).expect("re-import of own export");
        assert_eq!(env.export_text(), second.export_text());
    }
});
