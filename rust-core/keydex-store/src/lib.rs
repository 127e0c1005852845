// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// KeyDex Indexed Document Store
//
// Records are stored under hashed primary keys on an ordered key-value
// engine. Each table may declare named secondary indexes; a record that
// carries every column of an index gets an existence-only entry under
// that index's value prefix, and an attribute entry listing those index
// keys so removal can clean them up exactly.
//
// # Modules
//
// - [`key`] -- Fixed-width hash prefixes and the three key shapes.
// - [`codec`] -- Field-map projection and CBOR record encoding.
// - [`schema`] -- Table and index definitions.
// - [`table`] -- Schema-bound tables that assemble documents for writing.
// - [`query`] -- The `Request` builder and index selection.
// - [`matcher`] -- Predicate evaluation over field maps.
// - [`transaction`] -- Insert, get, update, remove and paginated list.
// - [`store`] -- The cloneable `Store` handle and cancellation `Context`.
// - [`config`] -- `StoreConfig` with JSON loading and env overrides.
// - [`error`] -- `StoreError`, split into expected outcomes and fatal faults.
//
// # Example
//
// ```rust
// use keydex_engine::MemoryEngine;
// use keydex_store::{Context, Mode, Request, Schema, Store, StoreError};
// use serde::{Deserialize, Serialize};
//
// #[derive(Debug, PartialEq, Serialize, Deserialize)]
// struct Item {
//     name: String,
//     count: u32,
// }
//
// let schema = Schema::builder().index("items", "count", ["count"]).build().unwrap();
// let store = Store::with_schema(MemoryEngine::new(), schema).unwrap();
//
// let mut txn = store.begin(Mode::ReadWrite, &Context::background()).unwrap();
// txn.insert("items", "a", &Item { name: "bar".into(), count: 1 }).unwrap();
// txn.insert("items", "b", &Item { name: "baz".into(), count: 2 }).unwrap();
// txn.commit().unwrap();
//
// let txn = store.begin(Mode::ReadOnly, &Context::background()).unwrap();
// let items: Vec<Item> = txn.list("items", &Request::new().eq("count", &2)).unwrap();
// assert_eq!(items, vec![Item { name: "baz".into(), count: 2 }]);
//
// let none = txn.list::<Item>("items", &Request::new().eq("count", &7));
// assert!(matches!(none, Err(StoreError::NoContent)));
// ```

pub mod codec;
pub mod config;
pub mod error;
pub mod key;
pub mod matcher;
pub mod query;
pub mod schema;
pub mod store;
pub mod table;
pub mod transaction;

// Re-export the most commonly used types at the crate root for convenience.
pub use codec::FieldMap;
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use query::{Op, Predicate, Request};
pub use schema::{Schema, SchemaBuilder};
pub use store::{Context, Store};
pub use table::{Document, Index, Table};
pub use transaction::{Mode, Transaction};
