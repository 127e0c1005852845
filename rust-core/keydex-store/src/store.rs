// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! The store handle.
//!
//! A [`Store`] binds one engine to one immutable schema and configuration.
//! It is cheap to clone; every clone shares the same engine state. Work
//! happens in [`Transaction`]s opened with [`Store::begin`], or through the
//! [`Store::view`] and [`Store::update`] closures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use keydex_engine::Engine;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::schema::Schema;
use crate::table::Table;
use crate::transaction::{Mode, Session, Transaction};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Deadline and cancellation signal checked when a transaction begins.
///
/// Clones share the cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// A context that never expires.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context expiring at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    /// A context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`Context::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail with [`StoreError::Cancelled`] if cancelled or past the deadline.
    pub fn check(&self) -> StoreResult<()> {
        if self.is_cancelled() {
            return Err(StoreError::Cancelled("context cancelled".to_string()));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(StoreError::Cancelled("deadline exceeded".to_string()))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Resolved tables plus the configuration they were built from.
#[derive(Debug)]
pub(crate) struct Registry {
    tables: BTreeMap<String, Arc<Table>>,
    config: StoreConfig,
}

impl Registry {
    fn new(config: StoreConfig) -> Self {
        let tables = config
            .schema
            .table_names()
            .map(|name| {
                let table = Table::new(
                    name,
                    config.schema.indexes(name),
                    config.max_indexes_per_record,
                );
                (name.to_string(), Arc::new(table))
            })
            .collect();
        Self { tables, config }
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Resolve `name`. With an empty schema every non-empty name resolves
    /// to a table without indexes.
    pub(crate) fn table(&self, name: &str) -> StoreResult<Arc<Table>> {
        if let Some(table) = self.tables.get(name) {
            return Ok(Arc::clone(table));
        }
        if !self.config.schema.is_empty() {
            return Err(StoreError::NotFound(format!(
                "table '{name}' is not in the schema"
            )));
        }
        if name.is_empty() {
            return Err(StoreError::BadRequest("empty table name".to_string()));
        }
        Ok(Arc::new(Table::new(
            name,
            None,
            self.config.max_indexes_per_record,
        )))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct Inner<E> {
    engine: E,
    registry: Registry,
}

/// An indexed document store over an ordered key-value engine.
///
/// ```rust
/// use keydex_engine::MemoryEngine;
/// use keydex_store::{Request, Schema, Store};
/// use serde_json::{json, Value};
///
/// let schema = Schema::builder().index("tests", "name", ["name"]).build().unwrap();
/// let store = Store::with_schema(MemoryEngine::new(), schema).unwrap();
///
/// store
///     .update(|txn| txn.insert("tests", "foo1", &json!({"name": "bar", "count": 1})))
///     .unwrap();
///
/// let found: Vec<Value> = store
///     .view(|txn| txn.list("tests", &Request::new().eq("name", "bar")))
///     .unwrap();
/// assert_eq!(found, vec![json!({"name": "bar", "count": 1})]);
/// ```
pub struct Store<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for Store<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Engine> Store<E> {
    /// Open a store over `engine`.
    pub fn new(engine: E, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        info!(
            engine = engine.name(),
            tables = config.schema.table_names().count(),
            schemaless = config.schema.is_empty(),
            default_limit = config.default_limit,
            "Store opened"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                engine,
                registry: Registry::new(config),
            }),
        })
    }

    /// Open a store with the default configuration and `schema`.
    pub fn with_schema(engine: E, schema: Schema) -> StoreResult<Self> {
        Self::new(engine, StoreConfig::with_schema(schema))
    }

    /// The underlying engine.
    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    /// The configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        self.inner.registry.config()
    }

    /// Resolve a table handle.
    pub fn table(&self, name: &str) -> StoreResult<Arc<Table>> {
        self.inner.registry.table(name)
    }

    /// Begin a transaction.
    ///
    /// `ctx` is checked once, here. Operations inside the transaction never
    /// look at it again.
    pub fn begin(&self, mode: Mode, ctx: &Context) -> StoreResult<Transaction<'_>> {
        ctx.check()?;
        let engine = &self.inner.engine;
        let session = match mode {
            Mode::ReadWrite => Session::Txn(engine.begin(true)?),
            Mode::ReadOnly => Session::Txn(engine.begin(false)?),
            Mode::Batch => Session::Batch(engine.write_batch()?),
        };
        debug!(mode = ?mode, engine = engine.name(), "Transaction started");
        Ok(Transaction::new(&self.inner.registry, mode, session))
    }

    /// Run `f` in a read-only transaction, then discard it.
    pub fn view<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<R>,
    {
        let txn = self.begin(Mode::ReadOnly, &Context::background())?;
        let result = f(&txn);
        txn.discard();
        result
    }

    /// Run `f` in a read/write transaction and commit it if `f` succeeds.
    ///
    /// A commit conflict is returned as is; see [`StoreError::is_retryable`].
    pub fn update<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<R>,
    {
        let mut txn = self.begin(Mode::ReadWrite, &Context::background())?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.discard();
                Err(err)
            }
        }
    }
}

impl<E: Engine + 'static> Store<E> {
    /// [`Store::update`] on tokio's blocking pool.
    pub async fn update_blocking<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.update(f))
            .await
            .map_err(|err| StoreError::Task(err.to_string()))?
    }
}
