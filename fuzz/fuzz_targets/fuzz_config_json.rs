// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for StoreConfig JSON loading

#![no_main]

use keydex_engine::MemoryEngine;
use keydex_store::{Store, StoreConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Any config that loads must also open a store.
        if let Ok(config) = StoreConfig::from_json(s) {
            assert!(Store::new(MemoryEngine::new(), config).is_ok());
        }
    }
});
