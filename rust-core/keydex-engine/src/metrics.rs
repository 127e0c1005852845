// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for KeyDex engines.
//
// Wraps any `Engine` and transparently counts operations and bytes moved
// through the transactions and batches it hands out, plus commit outcomes.
// Counters are lock-free atomics so metering never serializes callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::backend::{Engine, EngineBatch, EngineTxn, Entry, KvPair};
use crate::error::StorageResult;

/// Accumulated statistics for an engine.
///
/// All counters are monotonically increasing until
/// [`MetricsEngine::reset_stats`] is called.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    /// Number of point lookups performed.
    pub get_count: u64,
    /// Number of entry writes (transactional and batched).
    pub set_count: u64,
    /// Number of key deletions (transactional and batched).
    pub delete_count: u64,
    /// Number of prefix scans opened.
    pub scan_count: u64,
    /// Number of successful commits and batch flushes.
    pub commit_count: u64,
    /// Number of commits rejected because another writer won.
    pub conflict_count: u64,
    /// Cumulative wall-clock latency of commits and flushes, in milliseconds.
    pub commit_latency_sum_ms: f64,
    /// Total value bytes returned by lookups and scans.
    pub total_bytes_read: u64,
    /// Total value bytes handed to writes.
    pub total_bytes_written: u64,
}

#[derive(Debug, Default)]
struct Counters {
    get: AtomicU64,
    set: AtomicU64,
    delete: AtomicU64,
    scan: AtomicU64,
    commit: AtomicU64,
    conflict: AtomicU64,
    commit_latency_us: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn record_commit(&self, started: Instant, result: &StorageResult<()>) {
        let micros = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        Self::bump(&self.commit_latency_us, micros);
        match result {
            Ok(()) => Self::bump(&self.commit, 1),
            Err(err) if err.is_retryable() => Self::bump(&self.conflict, 1),
            Err(_) => {}
        }
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            get_count: self.get.load(Ordering::Relaxed),
            set_count: self.set.load(Ordering::Relaxed),
            delete_count: self.delete.load(Ordering::Relaxed),
            scan_count: self.scan.load(Ordering::Relaxed),
            commit_count: self.commit.load(Ordering::Relaxed),
            conflict_count: self.conflict.load(Ordering::Relaxed),
            commit_latency_sum_ms: self.commit_latency_us.load(Ordering::Relaxed) as f64 / 1000.0,
            total_bytes_read: self.bytes_read.load(Ordering::Relaxed),
            total_bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.get,
            &self.set,
            &self.delete,
            &self.scan,
            &self.commit,
            &self.conflict,
            &self.commit_latency_us,
            &self.bytes_read,
            &self.bytes_written,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// An engine wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use keydex_engine::{Engine, Entry, MemoryEngine, MetricsEngine};
///
/// let metered = MetricsEngine::new(MemoryEngine::new());
/// let mut txn = metered.begin(true).unwrap();
/// txn.set(Entry::new(b"key".to_vec(), b"value".to_vec())).unwrap();
/// txn.get(b"key").unwrap();
/// txn.commit().unwrap();
///
/// let stats = metered.stats();
/// assert_eq!(stats.set_count, 1);
/// assert_eq!(stats.get_count, 1);
/// assert_eq!(stats.commit_count, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MetricsEngine<E> {
    inner: E,
    counters: Arc<Counters>,
}

impl<E: Engine> MetricsEngine<E> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Return a snapshot of the current statistics.
    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }

    /// Reset all statistics to zero.
    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    /// Return a reference to the inner engine.
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Engine> Engine for MetricsEngine<E> {
    fn begin(&self, writable: bool) -> StorageResult<Box<dyn EngineTxn + '_>> {
        let inner = self.inner.begin(writable)?;
        Ok(Box::new(MeteredTxn {
            inner,
            counters: &*self.counters,
        }))
    }

    fn write_batch(&self) -> StorageResult<Box<dyn EngineBatch + '_>> {
        let inner = self.inner.write_batch()?;
        Ok(Box::new(MeteredBatch {
            inner,
            counters: &*self.counters,
        }))
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

struct MeteredTxn<'e> {
    inner: Box<dyn EngineTxn + 'e>,
    counters: &'e Counters,
}

impl EngineTxn for MeteredTxn<'_> {
    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let result = self.inner.get(key);
        Counters::bump(&self.counters.get, 1);
        if let Ok(Some(ref value)) = result {
            Counters::bump(&self.counters.bytes_read, value.len() as u64);
        }
        result
    }

    fn set(&mut self, entry: Entry) -> StorageResult<()> {
        let written = entry.value.len() as u64;
        let result = self.inner.set(entry);
        Counters::bump(&self.counters.set, 1);
        if result.is_ok() {
            Counters::bump(&self.counters.bytes_written, written);
        }
        result
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        Counters::bump(&self.counters.delete, 1);
        self.inner.delete(key)
    }

    fn scan_prefix<'a>(
        &'a self,
        prefix: &[u8],
    ) -> StorageResult<Box<dyn Iterator<Item = KvPair> + 'a>> {
        let counters = self.counters;
        Counters::bump(&counters.scan, 1);
        let iter = self.inner.scan_prefix(prefix)?.inspect(move |(_, value)| {
            Counters::bump(&counters.bytes_read, value.len() as u64);
        });
        Ok(Box::new(iter))
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        let started = Instant::now();
        let counters = self.counters;
        let result = self.inner.commit();
        counters.record_commit(started, &result);
        result
    }

    fn discard(self: Box<Self>) {
        self.inner.discard();
    }
}

struct MeteredBatch<'e> {
    inner: Box<dyn EngineBatch + 'e>,
    counters: &'e Counters,
}

impl EngineBatch for MeteredBatch<'_> {
    fn set(&mut self, entry: Entry) -> StorageResult<()> {
        let written = entry.value.len() as u64;
        let result = self.inner.set(entry);
        Counters::bump(&self.counters.set, 1);
        if result.is_ok() {
            Counters::bump(&self.counters.bytes_written, written);
        }
        result
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<()> {
        Counters::bump(&self.counters.delete, 1);
        self.inner.delete(key)
    }

    fn flush(self: Box<Self>) -> StorageResult<()> {
        let started = Instant::now();
        let counters = self.counters;
        let result = self.inner.flush();
        counters.record_commit(started, &result);
        result
    }
}
