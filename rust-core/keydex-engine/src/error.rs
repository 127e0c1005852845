// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine error types for KeyDex.
//
// A single enum covers every failure the raw engine can report: commit
// conflicts between concurrent writers, writes against read-only
// transactions, and size limit violations.
// Missing keys are not errors at this layer; lookups return `Option`.

use thiserror::Error;

/// Errors that can occur when interacting with an engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Another writer committed after this transaction's snapshot was taken.
    /// The caller is expected to retry the whole transaction.
    #[error("transaction conflict: snapshot v{snapshot} is behind committed v{committed}")]
    Conflict {
        /// Version the transaction read from.
        snapshot: u64,
        /// Version committed by the other writer.
        committed: u64,
    },

    /// A write was attempted on a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// Keys must contain at least one byte.
    #[error("empty key")]
    EmptyKey,

    /// The key exceeds the maximum allowed size.
    #[error("key too large: {size} bytes (max: {max})")]
    KeyTooLarge {
        /// Actual key size in bytes.
        size: usize,
        /// Maximum allowed key size in bytes.
        max: usize,
    },

    /// The value exceeds the maximum allowed size.
    #[error("value too large: {size} bytes (max: {max})")]
    ValueTooLarge {
        /// Actual value size in bytes.
        size: usize,
        /// Maximum allowed value size in bytes.
        max: usize,
    },

    /// The engine cannot serve requests (e.g., poisoned internal state).
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether retrying the transaction from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Convenience alias for engine results.
pub type StorageResult<T> = Result<T, StorageError>;
