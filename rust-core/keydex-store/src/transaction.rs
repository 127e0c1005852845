// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Indexed transactions.
//!
//! A [`Transaction`] wraps one engine session and owns every piece of index
//! bookkeeping: writing index entries and the attribute list on insert,
//! cleaning them up on update and remove, and dereferencing index entries
//! while listing.
//!
//! # Write layout
//!
//! ```text
//! insert(t, k, v)
//!   index keys      hash(t, index, values) ‖ primary   -> (empty)
//!   attributes      hash(t) ‖ 0x01 ‖ k                 -> [index keys]   (only if any)
//!   primary         hash(t) ‖ 0x00 ‖ k                 -> CBOR(v)        (written last)
//! ```
//!
//! Every entry of one record carries the same TTL, so index entries never
//! outlive the record they point at.
//!
//! Nothing here retries. A commit conflict surfaces as
//! [`StoreError::Engine`] and [`StoreError::is_retryable`] tells the caller
//! to run the whole transaction again.

use std::time::Duration;

use keydex_engine::{EngineBatch, EngineTxn, Entry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::{self, FieldMap};
use crate::error::{StoreError, StoreResult};
use crate::key::Key;
use crate::matcher;
use crate::query::Request;
use crate::store::Registry;
use crate::table::Table;

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// The kind of engine session behind a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Snapshot transaction with read-your-writes; commit may conflict.
    ReadWrite,
    /// Snapshot transaction that rejects writes.
    ReadOnly,
    /// Write-only batch for bulk loading. Reads fail with
    /// [`StoreError::NotReadCapable`].
    Batch,
}

impl Mode {
    /// Whether `get` and `list` are available in this mode.
    pub fn can_read(self) -> bool {
        !matches!(self, Self::Batch)
    }
}

pub(crate) enum Session<'s> {
    Txn(Box<dyn EngineTxn + 's>),
    Batch(Box<dyn EngineBatch + 's>),
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// One read/write or batch session against the store.
///
/// Dropping a transaction without [`Transaction::commit`] discards it.
pub struct Transaction<'s> {
    registry: &'s Registry,
    mode: Mode,
    session: Session<'s>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(registry: &'s Registry, mode: Mode, session: Session<'s>) -> Self {
        Self {
            registry,
            mode,
            session,
        }
    }

    /// The mode this transaction was begun in.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Store `value` under `key`, populating every index it covers.
    ///
    /// An existing record under the same key is overwritten without
    /// touching its old index entries; use [`Transaction::update`] to
    /// replace a record cleanly.
    pub fn insert<V>(&mut self, table: &str, key: impl AsRef<[u8]>, value: &V) -> StoreResult<()>
    where
        V: Serialize + ?Sized,
    {
        let table = self.registry.table(table)?;
        self.put(&table, key.as_ref(), value, None)
    }

    /// [`Transaction::insert`] with a time-to-live applied to the record and
    /// all of its index entries.
    pub fn insert_with_ttl<V>(
        &mut self,
        table: &str,
        key: impl AsRef<[u8]>,
        value: &V,
        ttl: Duration,
    ) -> StoreResult<()>
    where
        V: Serialize + ?Sized,
    {
        let table = self.registry.table(table)?;
        self.put(&table, key.as_ref(), value, Some(ttl))
    }

    /// Fetch the record stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, table: &str, key: impl AsRef<[u8]>) -> StoreResult<T> {
        let table = self.registry.table(table)?;
        let key = key.as_ref();
        let bytes = self
            .reader()?
            .get(table.primary_key(key).as_bytes())?
            .ok_or_else(|| not_found(&table, key))?;
        codec::decode(&bytes)
    }

    /// Replace an existing record.
    ///
    /// Fails with NotFound when `key` holds no record. The index entries
    /// listed for the old record are deleted before the new value is
    /// written, so an index the new value no longer covers stops returning
    /// the record.
    pub fn update<V>(&mut self, table: &str, key: impl AsRef<[u8]>, value: &V) -> StoreResult<()>
    where
        V: Serialize + ?Sized,
    {
        let table = self.registry.table(table)?;
        self.replace(&table, key.as_ref(), value, None)
    }

    /// [`Transaction::update`] with a time-to-live for the new record.
    pub fn update_with_ttl<V>(
        &mut self,
        table: &str,
        key: impl AsRef<[u8]>,
        value: &V,
        ttl: Duration,
    ) -> StoreResult<()>
    where
        V: Serialize + ?Sized,
    {
        let table = self.registry.table(table)?;
        self.replace(&table, key.as_ref(), value, Some(ttl))
    }

    /// Delete a record together with its index entries.
    ///
    /// On an indexed table a record without an attribute list is only
    /// reported as NotFound if its primary key is absent too; a record that
    /// populated no index has no list to read.
    pub fn remove(&mut self, table: &str, key: impl AsRef<[u8]>) -> StoreResult<()> {
        let table = self.registry.table(table)?;
        let key = key.as_ref();
        let primary = table.primary_key(key);

        let removed = if table.has_indexes() {
            let attributes = table.attribute_key(key);
            let listed = self.reader()?.get(attributes.as_bytes())?;
            match listed {
                Some(bytes) => {
                    let index_keys = codec::decode_keys(&bytes)?;
                    for index_key in &index_keys {
                        self.erase(index_key)?;
                    }
                    self.erase(&attributes)?;
                    index_keys.len()
                }
                None => {
                    if self.reader()?.get(primary.as_bytes())?.is_none() {
                        return Err(not_found(&table, key));
                    }
                    0
                }
            }
        } else {
            self.reader()?;
            0
        };

        self.erase(&primary)?;
        debug!(table = %table.name(), index_entries = removed, "Record removed");
        Ok(())
    }

    /// Collect the page of records matching `request`, in key order.
    ///
    /// Fails with NotFound when nothing matches and the limit is 1, and
    /// with NoContent when nothing matches and the limit is larger.
    pub fn list<T: DeserializeOwned>(&self, table: &str, request: &Request) -> StoreResult<Vec<T>> {
        self.scan(table, request)?
            .into_iter()
            .map(|record| {
                record.deserialized::<T>().map_err(|err| {
                    StoreError::Codec(format!("record does not fit the requested type: {err}"))
                })
            })
            .collect()
    }

    /// [`Transaction::list`] returning field maps.
    pub fn list_fields(&self, table: &str, request: &Request) -> StoreResult<Vec<FieldMap>> {
        self.scan(table, request)?
            .iter()
            .map(|record| {
                codec::stored_fields(record).ok_or_else(|| {
                    StoreError::NotProjectable("stored record is not a map".to_string())
                })
            })
            .collect()
    }

    /// Publish every write.
    pub fn commit(self) -> StoreResult<()> {
        match self.session {
            Session::Txn(txn) => txn.commit()?,
            Session::Batch(batch) => batch.flush()?,
        }
        debug!(mode = ?self.mode, "Transaction committed");
        Ok(())
    }

    /// Abandon every write.
    pub fn discard(self) {
        if let Session::Txn(txn) = self.session {
            txn.discard();
        }
        debug!(mode = ?self.mode, "Transaction discarded");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn put<V>(&mut self, table: &Table, key: &[u8], value: &V, ttl: Option<Duration>) -> StoreResult<()>
    where
        V: Serialize + ?Sized,
    {
        let document = table.new_document(key, value)?;
        for index_key in &document.index_keys {
            self.write(index_key.clone(), Vec::new(), ttl)?;
        }
        if !document.index_keys.is_empty() {
            let listed = codec::encode_keys(&document.index_keys)?;
            self.write(document.attributes, listed, ttl)?;
        }
        self.write(document.primary, document.value, ttl)?;
        debug!(
            table = %table.name(),
            index_entries = document.index_keys.len(),
            ttl = ?ttl,
            "Record written"
        );
        Ok(())
    }

    fn replace<V>(&mut self, table: &Table, key: &[u8], value: &V, ttl: Option<Duration>) -> StoreResult<()>
    where
        V: Serialize + ?Sized,
    {
        let primary = table.primary_key(key);
        if self.reader()?.get(primary.as_bytes())?.is_none() {
            return Err(not_found(table, key));
        }
        if table.has_indexes() {
            let attributes = table.attribute_key(key);
            let listed = self.reader()?.get(attributes.as_bytes())?;
            if let Some(bytes) = listed {
                let stale = codec::decode_keys(&bytes)?;
                for index_key in &stale {
                    self.erase(index_key)?;
                }
                self.erase(&attributes)?;
                debug!(table = %table.name(), stale = stale.len(), "Cleared old index entries");
            }
        }
        self.put(table, key, value, ttl)
    }

    fn scan(&self, table: &str, request: &Request) -> StoreResult<Vec<ciborium::Value>> {
        let reader = self.reader()?;
        request.validate()?;
        let (skip, limit) = request.window(self.registry.config().default_limit)?;
        let table = self.registry.table(table)?;

        let selected = request.select_index(&table)?;
        let range = match &selected {
            Some((_, prefix)) => prefix.to_vec(),
            None => table.primary_range(),
        };
        debug!(
            table = %table.name(),
            index = selected.as_ref().map(|(index, _)| index.name()),
            skip,
            limit,
            "Listing records"
        );

        let mut skipped = 0;
        let mut page = Vec::new();
        for (key, bytes) in reader.scan_prefix(&range)? {
            let bytes = if selected.is_some() {
                dereference(reader, &table, Key::from(key))?
            } else {
                bytes
            };
            let record = codec::decode_stored(&bytes)?;
            let fields = codec::stored_fields(&record).unwrap_or_default();
            if !matcher::matches(&fields, request.predicates())? {
                continue;
            }
            if skipped < skip {
                skipped += 1;
                continue;
            }
            page.push(restrict(record, request.projection()));
            if page.len() == limit {
                break;
            }
        }

        if page.is_empty() {
            return Err(if limit == 1 {
                StoreError::NotFound(format!("no record in '{}' matches", table.name()))
            } else {
                StoreError::NoContent
            });
        }
        Ok(page)
    }

    fn reader(&self) -> StoreResult<&dyn EngineTxn> {
        match &self.session {
            Session::Txn(txn) => Ok(&**txn),
            Session::Batch(_) => Err(StoreError::NotReadCapable),
        }
    }

    fn write(&mut self, key: Key, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        let entry = Entry::new(key.into_bytes(), value).with_ttl(ttl);
        match &mut self.session {
            Session::Txn(txn) => txn.set(entry)?,
            Session::Batch(batch) => batch.set(entry)?,
        }
        Ok(())
    }

    fn erase(&mut self, key: &Key) -> StoreResult<()> {
        match &mut self.session {
            Session::Txn(txn) => txn.delete(key.as_bytes())?,
            Session::Batch(batch) => batch.delete(key.as_bytes())?,
        }
        Ok(())
    }
}

/// Follow an index entry to the record it points at.
fn dereference(reader: &dyn EngineTxn, table: &Table, index_key: Key) -> StoreResult<Vec<u8>> {
    let Some(primary) = index_key
        .strip_index_prefix()
        .filter(|primary| primary.is_primary_of(table.prefix()))
    else {
        warn!(table = %table.name(), key = ?index_key, "Index entry does not hold a primary key");
        return Err(StoreError::Inconsistent(format!(
            "index entry {index_key:?} in '{}' does not point at a record",
            table.name()
        )));
    };
    match reader.get(primary.as_bytes())? {
        Some(bytes) => Ok(bytes),
        None => {
            warn!(table = %table.name(), primary = ?primary, "Index entry points at a missing record");
            Err(StoreError::Inconsistent(format!(
                "index entry points at missing record {primary:?} in '{}'",
                table.name()
            )))
        }
    }
}

fn restrict(record: ciborium::Value, fields: &[String]) -> ciborium::Value {
    match record {
        ciborium::Value::Map(mut entries) if !fields.is_empty() => {
            entries.retain(|(name, _)| {
                codec::column_name(name).is_some_and(|name| fields.contains(&name))
            });
            ciborium::Value::Map(entries)
        }
        other => other,
    }
}

fn not_found(table: &Table, key: &[u8]) -> StoreError {
    StoreError::NotFound(format!("{}/{}", table.name(), String::from_utf8_lossy(key)))
}
