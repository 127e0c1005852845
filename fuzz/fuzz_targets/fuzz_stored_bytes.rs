// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for decoding stored records and attribute lists

#![no_main]

use keydex_engine::{Engine, Entry, MemoryEngine};
use keydex_store::{codec, Request, Schema, Store};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must fail cleanly, never panic.
    let _ = codec::decode::<serde_json::Value>(data);
    if let Ok(record) = codec::decode_stored(data) {
        let _ = codec::stored_fields(&record);
    }
    let _ = codec::decode_keys(data);

    // Garbage planted under a primary key must surface as an error from
    // get and list, not a panic.
    let Ok(schema) = Schema::builder().index("fuzz", "name", ["name"]).build() else {
        return;
    };
    let Ok(store) = Store::with_schema(MemoryEngine::new(), schema) else {
        return;
    };
    let Ok(table) = store.table("fuzz") else {
        return;
    };
    if let Ok(mut raw) = store.engine().begin(true) {
        let _ = raw.set(Entry::new(table.primary_key(b"k").into_bytes(), data.to_vec()));
        let _ = raw.set(Entry::new(table.attribute_key(b"k").into_bytes(), data.to_vec()));
        let _ = raw.commit();
    }
    let _ = store.view(|txn| txn.get::<serde_json::Value>("fuzz", "k"));
    let _ = store.view(|txn| txn.list::<serde_json::Value>("fuzz", &Request::new().px("name", "a")));
    let _ = store.update(|txn| txn.remove("fuzz", "k"));
});
