// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// KeyDex Engine Abstraction
//
// This crate defines the raw ordered key-value engine that the KeyDex
// document store is built on. The `Engine` trait hands out snapshot
// transactions (read-only or read/write) and write-only batches; keys are
// ordered bytes so prefix scans visit contiguous ranges.
//
// # Modules
//
// - [`backend`] -- The `Engine`, `EngineTxn` and `EngineBatch` traits.
// - [`error`] -- The `StorageError` enum covering all engine failure modes.
// - [`memory`] -- A volatile `BTreeMap` engine with copy-on-write snapshots,
//   optimistic commit conflict detection and per-entry TTL.
// - [`metrics`] -- A transparent wrapper that collects operation statistics.
//
// # Example
//
// ```rust
// use keydex_engine::{Engine, Entry, MemoryEngine, MetricsEngine};
//
// let engine = MetricsEngine::new(MemoryEngine::new());
// let mut txn = engine.begin(true).unwrap();
// txn.set(Entry::new(b"k1".to_vec(), b"v1".to_vec())).unwrap();
// txn.commit().unwrap();
//
// let txn = engine.begin(false).unwrap();
// assert_eq!(txn.scan_prefix(b"k").unwrap().count(), 1);
// assert_eq!(engine.stats().commit_count, 1);
// ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod metrics;

// Re-export the most commonly used types at the crate root for convenience.
pub use backend::{Engine, EngineBatch, EngineTxn, Entry, KvPair};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryEngine;
pub use metrics::{EngineStats, MetricsEngine};
