// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store error types for KeyDex.
//
// Errors fall into two groups. NotFound, NoContent, BadRequest and
// Cancelled are ordinary outcomes a caller is expected to handle. Every
// other variant means a codec failure, corrupted bookkeeping or an engine
// fault, and must not be swallowed.

use keydex_engine::StorageError;
use thiserror::Error;

/// Errors returned by the indexed document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A point lookup (or a single-item list) matched nothing, or a table
    /// name is absent from a configured schema.
    #[error("not found: {0}")]
    NotFound(String),

    /// A multi-item list matched nothing.
    #[error("no content")]
    NoContent,

    /// Caller-supplied input is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The transaction was begun after its context was cancelled or its
    /// deadline passed.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A read operation was attempted on a write-only batch transaction.
    #[error("transaction is not read-capable")]
    NotReadCapable,

    /// The schema definition is invalid.
    #[error("schema error: {0}")]
    Schema(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// A value could not be projected into a field map.
    #[error("not a projectable record: {0}")]
    NotProjectable(String),

    /// A value could not be encoded, or a predicate value could not be
    /// converted into the requested type.
    #[error("codec error: {0}")]
    Codec(String),

    /// Stored bytes could not be decoded.
    #[error("corrupted data: {0}")]
    Corrupted(String),

    /// An index entry points at a record that does not exist.
    #[error("consistency violation: {0}")]
    Inconsistent(String),

    /// One record would populate more index entries than allowed.
    #[error("record produces {count} index entries (max: {max})")]
    TooManyIndexes {
        /// Number of index entries the record produced.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Two values of incomparable kinds were ordered against each other.
    #[error("cannot compare field '{field}': {detail}")]
    Incomparable {
        /// The field being compared.
        field: String,
        /// What was compared against what.
        detail: String,
    },

    /// The underlying engine failed.
    #[error("engine error: {0}")]
    Engine(#[from] StorageError),

    /// A blocking helper task panicked or was cancelled by the runtime.
    #[error("background task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Whether this error signals an invariant violation rather than an
    /// expected outcome.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NotFound(_) | Self::NoContent | Self::BadRequest(_) | Self::Cancelled(_)
        )
    }

    /// Whether this error is a NotFound.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether retrying the whole transaction may succeed (commit conflict).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Engine(err) if err.is_retryable())
    }
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;
