// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core engine traits for KeyDex.
//
// An `Engine` hands out two kinds of sessions: snapshot transactions that
// can read and (optionally) write, and write-only batches tuned for bulk
// loading. Keys and values are opaque bytes; keys are ordered
// lexicographically so that prefix scans visit a contiguous range.

use std::time::Duration;

use crate::error::StorageResult;

/// A key/value pair as yielded by a prefix scan.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// One write against the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The key to write.
    pub key: Vec<u8>,
    /// The value bytes. Existence-only entries carry an empty value.
    pub value: Vec<u8>,
    /// Optional time-to-live. Expired entries become invisible to reads.
    pub ttl: Option<Duration>,
}

impl Entry {
    /// Create an entry without expiry.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl: None,
        }
    }

    /// Set (or clear) the time-to-live of this entry.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A pluggable ordered key-value engine.
///
/// Implementations must be safe to share across threads. Read transactions
/// observe a consistent snapshot; write transactions commit one at a time
/// and report a [`crate::StorageError::Conflict`] when another writer got
/// there first.
pub trait Engine: Send + Sync {
    /// Open a transaction. Read-only transactions reject writes.
    fn begin(&self, writable: bool) -> StorageResult<Box<dyn EngineTxn + '_>>;

    /// Open a write-only batch.
    fn write_batch(&self) -> StorageResult<Box<dyn EngineBatch + '_>>;

    /// A human-readable name for this engine, used in logging.
    fn name(&self) -> &str;
}

/// A snapshot transaction against an [`Engine`].
///
/// Dropping a transaction without calling [`EngineTxn::commit`] discards
/// every write it made.
pub trait EngineTxn {
    /// Whether this transaction accepts writes.
    fn is_writable(&self) -> bool;

    /// Retrieve the value stored at `key`, or `None` if it is absent or
    /// expired. Write transactions see their own uncommitted writes.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Store an entry, overwriting any previous value for its key.
    fn set(&mut self, entry: Entry) -> StorageResult<()>;

    /// Delete `key`. Deleting an absent key is not an error.
    fn delete(&mut self, key: &[u8]) -> StorageResult<()>;

    /// Iterate every live entry whose key starts with `prefix`, in
    /// ascending key order.
    fn scan_prefix<'a>(
        &'a self,
        prefix: &[u8],
    ) -> StorageResult<Box<dyn Iterator<Item = KvPair> + 'a>>;

    /// Publish every write made by this transaction.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Abandon the transaction.
    fn discard(self: Box<Self>) {}
}

/// A write-only batch against an [`Engine`].
///
/// Writes are buffered and become visible together at [`EngineBatch::flush`].
/// There is no read-your-writes and no conflict detection.
pub trait EngineBatch {
    /// Buffer an entry write.
    fn set(&mut self, entry: Entry) -> StorageResult<()>;

    /// Buffer a key deletion.
    fn delete(&mut self, key: &[u8]) -> StorageResult<()>;

    /// Apply every buffered write.
    fn flush(self: Box<Self>) -> StorageResult<()>;
}
