// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory engine for KeyDex.
//
// The committed state is a `BTreeMap` behind an `Arc`, guarded by a
// `RwLock` together with a monotonically increasing version. Transactions
// take a snapshot by cloning the `Arc`; the first write copies the map
// (copy-on-write), so readers never observe uncommitted data. Commit swaps
// the working copy in only if nobody else committed since the snapshot.
// All data lives in process memory and is lost on drop.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::backend::{Engine, EngineBatch, EngineTxn, Entry, KvPair};
use crate::error::{StorageError, StorageResult};

/// Maximum key size accepted by the memory engine.
pub const MAX_KEY_SIZE: usize = 64 * 1024;

/// Maximum value size accepted by the memory engine.
pub const MAX_VALUE_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Vec<u8>, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

type Map = BTreeMap<Vec<u8>, Slot>;

#[derive(Debug, Default)]
struct State {
    data: Arc<Map>,
    version: u64,
}

/// A volatile engine backed by a sorted `BTreeMap`.
///
/// Cloning the handle shares the underlying state, so one engine can back
/// any number of stores and threads.
///
/// # Example
///
/// ```rust
/// use keydex_engine::{Engine, Entry, MemoryEngine};
///
/// let engine = MemoryEngine::new();
/// let mut txn = engine.begin(true).unwrap();
/// txn.set(Entry::new(b"hello".to_vec(), b"world".to_vec())).unwrap();
/// txn.commit().unwrap();
///
/// let txn = engine.begin(false).unwrap();
/// assert_eq!(txn.get(b"hello").unwrap(), Some(b"world".to_vec()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    state: Arc<RwLock<State>>,
}

impl MemoryEngine {
    /// Create a new, empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys in the committed state.
    pub fn len(&self) -> StorageResult<usize> {
        let now = Instant::now();
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.data.values().filter(|slot| slot.is_live(now)).count())
    }

    /// Return true if the committed state holds no live keys.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// The version of the committed state. Every commit and flush that
    /// writes something bumps it by one.
    pub fn version(&self) -> StorageResult<u64> {
        Ok(self.state.read().map_err(poisoned)?.version)
    }

    fn snapshot(&self) -> StorageResult<(Arc<Map>, u64)> {
        let state = self.state.read().map_err(poisoned)?;
        Ok((Arc::clone(&state.data), state.version))
    }
}

impl Engine for MemoryEngine {
    fn begin(&self, writable: bool) -> StorageResult<Box<dyn EngineTxn + '_>> {
        let (data, version) = self.snapshot()?;
        Ok(Box::new(MemoryTxn {
            state: &*self.state,
            data,
            version,
            writable,
            dirty: false,
        }))
    }

    fn write_batch(&self) -> StorageResult<Box<dyn EngineBatch + '_>> {
        Ok(Box::new(MemoryBatch {
            state: &*self.state,
            ops: Vec::new(),
        }))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StorageError {
    StorageError::Unavailable("engine state lock poisoned".to_string())
}

fn validate_key(key: &[u8]) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::EmptyKey);
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(StorageError::KeyTooLarge {
            size: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}

fn validate_entry(entry: &Entry) -> StorageResult<()> {
    validate_key(&entry.key)?;
    if entry.value.len() > MAX_VALUE_SIZE {
        return Err(StorageError::ValueTooLarge {
            size: entry.value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

fn purge_expired(map: &mut Map, now: Instant) {
    map.retain(|_, slot| slot.is_live(now));
}

struct MemoryTxn<'e> {
    state: &'e RwLock<State>,
    data: Arc<Map>,
    version: u64,
    writable: bool,
    dirty: bool,
}

impl EngineTxn for MemoryTxn<'_> {
    fn is_writable(&self) -> bool {
        self.writable
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let now = Instant::now();
        Ok(self
            .data
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone()))
    }

    fn set(&mut self, entry: Entry) -> StorageResult<()> {
        if !self.writable {
            return Err(StorageError::ReadOnly);
        }
        validate_entry(&entry)?;
        let slot = Slot::new(entry.value, entry.ttl, Instant::now());
        Arc::make_mut(&mut self.data).insert(entry.key, slot);
        self.dirty = true;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        if !self.writable {
            return Err(StorageError::ReadOnly);
        }
        validate_key(key)?;
        if self.data.contains_key(key) {
            Arc::make_mut(&mut self.data).remove(key);
            self.dirty = true;
        }
        Ok(())
    }

    fn scan_prefix<'a>(
        &'a self,
        prefix: &[u8],
    ) -> StorageResult<Box<dyn Iterator<Item = KvPair> + 'a>> {
        let now = Instant::now();
        let prefix = prefix.to_vec();
        let iter = self
            .data
            .range(prefix.clone()..)
            .take_while(move |(key, _)| key.starts_with(&prefix))
            .filter(move |(_, slot)| slot.is_live(now))
            .map(|(key, slot)| (key.clone(), slot.value.clone()));
        Ok(Box::new(iter))
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let lock = self.state;
        let mut state = lock.write().map_err(poisoned)?;
        if state.version != self.version {
            warn!(
                snapshot = self.version,
                committed = state.version,
                "write transaction lost the commit race"
            );
            return Err(StorageError::Conflict {
                snapshot: self.version,
                committed: state.version,
            });
        }
        let mut data = self.data;
        purge_expired(Arc::make_mut(&mut data), Instant::now());
        state.data = data;
        state.version += 1;
        debug!(version = state.version, "committed memory transaction");
        Ok(())
    }
}

enum BatchOp {
    Set(Entry),
    Delete(Vec<u8>),
}

struct MemoryBatch<'e> {
    state: &'e RwLock<State>,
    ops: Vec<BatchOp>,
}

impl EngineBatch for MemoryBatch<'_> {
    fn set(&mut self, entry: Entry) -> StorageResult<()> {
        validate_entry(&entry)?;
        self.ops.push(BatchOp::Set(entry));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.ops.push(BatchOp::Delete(key.to_vec()));
        Ok(())
    }

    fn flush(self: Box<Self>) -> StorageResult<()> {
        if self.ops.is_empty() {
            return Ok(());
        }
        let count = self.ops.len();
        let lock = self.state;
        let mut state = lock.write().map_err(poisoned)?;
        let now = Instant::now();
        let data = Arc::make_mut(&mut state.data);
        for op in self.ops {
            match op {
                BatchOp::Set(entry) => {
                    data.insert(entry.key, Slot::new(entry.value, entry.ttl, now));
                }
                BatchOp::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        purge_expired(data, now);
        state.version += 1;
        debug!(ops = count, version = state.version, "flushed memory batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(engine: &MemoryEngine, key: &[u8], value: &[u8]) {
        let mut txn = engine.begin(true).unwrap();
        txn.set(Entry::new(key.to_vec(), value.to_vec())).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn test_basic_crud() {
        let engine = MemoryEngine::new();
        assert!(engine.is_empty().unwrap());

        put(&engine, b"key1", b"value1");
        let txn = engine.begin(false).unwrap();
        assert_eq!(txn.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(txn.get(b"missing").unwrap(), None);
        drop(txn);

        // Overwrite.
        put(&engine, b"key1", b"updated");
        assert_eq!(engine.len().unwrap(), 1);

        let mut txn = engine.begin(true).unwrap();
        txn.delete(b"key1").unwrap();
        // Deleting an absent key is fine.
        txn.delete(b"nonexistent").unwrap();
        txn.commit().unwrap();
        assert!(engine.is_empty().unwrap());
    }

    #[test]
    fn test_read_your_writes() {
        let engine = MemoryEngine::new();
        let mut txn = engine.begin(true).unwrap();
        txn.set(Entry::new(b"k".to_vec(), b"v".to_vec())).unwrap();
        assert_eq!(txn.get(b"k").unwrap(), Some(b"v".to_vec()));

        // Not visible outside until commit.
        let reader = engine.begin(false).unwrap();
        assert_eq!(reader.get(b"k").unwrap(), None);
        drop(reader);

        txn.commit().unwrap();
        let reader = engine.begin(false).unwrap();
        assert_eq!(reader.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_snapshot_isolation() {
        let engine = MemoryEngine::new();
        put(&engine, b"k", b"old");

        let reader = engine.begin(false).unwrap();
        put(&engine, b"k", b"new");
        assert_eq!(reader.get(b"k").unwrap(), Some(b"old".to_vec()));
    }

    #[test]
    fn test_commit_conflict() {
        let engine = MemoryEngine::new();
        let mut first = engine.begin(true).unwrap();
        let mut second = engine.begin(true).unwrap();

        first.set(Entry::new(b"a".to_vec(), b"1".to_vec())).unwrap();
        second.set(Entry::new(b"a".to_vec(), b"2".to_vec())).unwrap();

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(err, StorageError::Conflict { snapshot: 0, committed: 1 }));
        assert!(err.is_retryable());

        let reader = engine.begin(false).unwrap();
        assert_eq!(reader.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let engine = MemoryEngine::new();
        let mut txn = engine.begin(false).unwrap();
        assert!(!txn.is_writable());
        assert_eq!(
            txn.set(Entry::new(b"k".to_vec(), b"v".to_vec())),
            Err(StorageError::ReadOnly)
        );
        assert_eq!(txn.delete(b"k"), Err(StorageError::ReadOnly));
        // Committing a read-only transaction is a no-op.
        txn.commit().unwrap();
    }

    #[test]
    fn test_drop_discards() {
        let engine = MemoryEngine::new();
        {
            let mut txn = engine.begin(true).unwrap();
            txn.set(Entry::new(b"k".to_vec(), b"v".to_vec())).unwrap();
        }
        assert!(engine.is_empty().unwrap());
        assert_eq!(engine.version().unwrap(), 0);
    }

    #[test]
    fn test_scan_prefix_ordered() {
        let engine = MemoryEngine::new();
        put(&engine, b"user:2:name", b"Bob");
        put(&engine, b"user:1:name", b"Alice");
        put(&engine, b"user:1:age", b"30");
        put(&engine, b"post:1:title", b"Hello");

        let txn = engine.begin(false).unwrap();
        let keys: Vec<Vec<u8>> = txn
            .scan_prefix(b"user:1:")
            .unwrap()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"user:1:age".to_vec(), b"user:1:name".to_vec()]);

        assert_eq!(txn.scan_prefix(b"user:").unwrap().count(), 3);
        assert_eq!(txn.scan_prefix(b"missing:").unwrap().count(), 0);
    }

    #[test]
    fn test_ttl_expiry() {
        let engine = MemoryEngine::new();
        let mut txn = engine.begin(true).unwrap();
        txn.set(Entry::new(b"gone".to_vec(), b"x".to_vec()).with_ttl(Some(Duration::ZERO)))
            .unwrap();
        txn.set(
            Entry::new(b"kept".to_vec(), b"y".to_vec())
                .with_ttl(Some(Duration::from_secs(3600))),
        )
        .unwrap();
        txn.commit().unwrap();

        let reader = engine.begin(false).unwrap();
        assert_eq!(reader.get(b"gone").unwrap(), None);
        assert_eq!(reader.get(b"kept").unwrap(), Some(b"y".to_vec()));
        assert_eq!(reader.scan_prefix(b"").unwrap().count(), 1);
        assert_eq!(engine.len().unwrap(), 1);
    }

    #[test]
    fn test_batch_visible_after_flush() {
        let engine = MemoryEngine::new();
        let mut batch = engine.write_batch().unwrap();
        batch.set(Entry::new(b"x".to_vec(), b"10".to_vec())).unwrap();
        batch.set(Entry::new(b"y".to_vec(), b"20".to_vec())).unwrap();
        assert!(engine.is_empty().unwrap());
        batch.flush().unwrap();

        assert_eq!(engine.len().unwrap(), 2);
        assert_eq!(engine.version().unwrap(), 1);

        let mut batch = engine.write_batch().unwrap();
        batch.delete(b"x").unwrap();
        batch.flush().unwrap();
        assert_eq!(engine.len().unwrap(), 1);
    }

    #[test]
    fn test_batch_flush_conflicts_with_open_writer() {
        let engine = MemoryEngine::new();
        let mut txn = engine.begin(true).unwrap();
        txn.set(Entry::new(b"a".to_vec(), b"1".to_vec())).unwrap();

        let mut batch = engine.write_batch().unwrap();
        batch.set(Entry::new(b"b".to_vec(), b"2".to_vec())).unwrap();
        batch.flush().unwrap();

        assert!(matches!(txn.commit(), Err(StorageError::Conflict { .. })));
    }

    #[test]
    fn test_key_validation() {
        let engine = MemoryEngine::new();
        let mut txn = engine.begin(true).unwrap();
        assert_eq!(
            txn.set(Entry::new(Vec::new(), b"v".to_vec())),
            Err(StorageError::EmptyKey)
        );
        let huge = vec![0u8; MAX_KEY_SIZE + 1];
        assert!(matches!(
            txn.set(Entry::new(huge, Vec::new())),
            Err(StorageError::KeyTooLarge { .. })
        ));
    }

    #[test]
    fn test_clone_shares_state() {
        let engine = MemoryEngine::new();
        let clone = engine.clone();
        put(&engine, b"shared", b"data");
        let txn = clone.begin(false).unwrap();
        assert_eq!(txn.get(b"shared").unwrap(), Some(b"data".to_vec()));
        assert_eq!(clone.name(), "in-memory");
    }
}
