// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Schema-bound table handles for KeyDex.
//
// A `Table` owns one primary-key namespace and a fixed set of secondary
// indexes. `Table::new_document` assembles everything one write needs:
// the primary key, the attribute key, the encoded record and the index
// keys the record can populate. Indexes whose columns are not all present
// on the record are skipped; the record stays reachable by primary key.

use serde::Serialize;
use serde_json::Value;

use crate::codec::{self, FieldMap};
use crate::error::{StoreError, StoreResult};
use crate::key::{self, Key, Prefix};
use crate::schema::IndexDefs;

/// A named secondary index: an ordered list of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    table: String,
    name: String,
    columns: Vec<String>,
}

impl Index {
    /// The index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The indexed columns, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Compute this index's prefix for a record. Returns `None` when any
    /// column is absent (or null) on the record.
    pub fn build(&self, fields: &FieldMap) -> StoreResult<Option<Prefix>> {
        let values: Option<Vec<&Value>> = self
            .columns
            .iter()
            .map(|column| codec::field(fields, column))
            .collect();
        values
            .map(|values| self.build_from_values(&values))
            .transpose()
    }

    /// Compute this index's prefix from column values given in column order.
    ///
    /// Values are hashed in [`codec::canonical`] form, so a predicate on
    /// `1.0` reaches a record stored with `1`.
    pub fn build_from_values(&self, values: &[&Value]) -> StoreResult<Prefix> {
        let values: Vec<Value> = values.iter().map(|value| codec::canonical(value)).collect();
        key::index_prefix(&self.table, &self.name, &values)
    }
}

/// The unit of a single write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Key holding the encoded record.
    pub primary: Key,
    /// Key holding the list of index keys built for the record.
    pub attributes: Key,
    /// The encoded record.
    pub value: Vec<u8>,
    /// Index keys the record populates.
    pub index_keys: Vec<Key>,
}

/// A schema-bound table handle.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    prefix: Prefix,
    indexes: Vec<Index>,
    max_indexes: usize,
}

impl Table {
    pub(crate) fn new(name: &str, defs: Option<&IndexDefs>, max_indexes: usize) -> Self {
        let indexes = defs
            .into_iter()
            .flatten()
            .map(|(index, columns)| Index {
                table: name.to_string(),
                name: index.clone(),
                columns: columns.clone(),
            })
            .collect();
        Self {
            name: name.to_string(),
            prefix: key::table_prefix(name),
            indexes,
            max_indexes,
        }
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The table's hash prefix.
    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    /// Secondary indexes, sorted by name.
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Look up an index by name.
    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Whether the table has at least one secondary index.
    pub fn has_indexes(&self) -> bool {
        !self.indexes.is_empty()
    }

    /// The primary key of `user_key`.
    pub fn primary_key(&self, user_key: &[u8]) -> Key {
        Key::primary(&self.prefix, user_key)
    }

    /// The attribute key of `user_key`.
    pub fn attribute_key(&self, user_key: &[u8]) -> Key {
        Key::attributes(&self.prefix, user_key)
    }

    /// The scan range covering every record of this table.
    pub fn primary_range(&self) -> Vec<u8> {
        key::primary_range(&self.prefix)
    }

    /// Assemble the document for writing `value` under `user_key`.
    pub fn new_document<V: Serialize + ?Sized>(
        &self,
        user_key: &[u8],
        value: &V,
    ) -> StoreResult<Document> {
        let primary = self.primary_key(user_key);
        let mut index_keys = Vec::new();
        if self.has_indexes() {
            let fields = codec::project(value)?;
            for index in &self.indexes {
                if let Some(prefix) = index.build(&fields)? {
                    index_keys.push(Key::index(&prefix, &primary));
                }
            }
            if index_keys.len() > self.max_indexes {
                return Err(StoreError::TooManyIndexes {
                    count: index_keys.len(),
                    max: self.max_indexes,
                });
            }
        }
        Ok(Document {
            attributes: self.attribute_key(user_key),
            value: codec::encode(value)?,
            primary,
            index_keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;

    fn tests_table(max: usize) -> Table {
        let schema = Schema::builder()
            .index("tests", "name", ["name"])
            .index("tests", "owner_kind", ["owner", "kind"])
            .build()
            .unwrap();
        Table::new("tests", schema.indexes("tests"), max)
    }

    #[test]
    fn test_indexes_sorted_and_found() {
        let table = tests_table(64);
        let names: Vec<&str> = table.indexes().iter().map(Index::name).collect();
        assert_eq!(names, vec!["name", "owner_kind"]);
        assert_eq!(table.index("owner_kind").unwrap().columns(), ["owner", "kind"]);
        assert!(table.index("missing").is_none());
    }

    #[test]
    fn test_document_builds_every_covered_index() {
        let table = tests_table(64);
        let doc = table
            .new_document(b"foo1", &json!({"name": "bar", "owner": "ann", "kind": 3}))
            .unwrap();
        assert_eq!(doc.primary, table.primary_key(b"foo1"));
        assert_eq!(doc.attributes, table.attribute_key(b"foo1"));
        assert_eq!(doc.index_keys.len(), 2);
        for index_key in &doc.index_keys {
            assert_eq!(index_key.strip_index_prefix(), Some(doc.primary.clone()));
        }
        let stored: Value = codec::decode(&doc.value).unwrap();
        assert_eq!(stored["owner"], json!("ann"));
    }

    #[test]
    fn test_document_skips_indexes_with_missing_columns() {
        let table = tests_table(64);
        // "kind" missing, "name" null: neither index applies.
        let doc = table
            .new_document(b"foo2", &json!({"name": null, "owner": "ann"}))
            .unwrap();
        assert!(doc.index_keys.is_empty());
    }

    #[test]
    fn test_index_prefix_matches_predicate_values() {
        let table = tests_table(64);
        let index = table.index("owner_kind").unwrap();
        let fields = codec::project(&json!({"owner": "ann", "kind": 3})).unwrap();
        let from_record = index.build(&fields).unwrap().unwrap();
        let from_values = index
            .build_from_values(&[&json!("ann"), &json!(3)])
            .unwrap();
        assert_eq!(from_record, from_values);
    }

    #[test]
    fn test_whole_floats_share_the_integer_prefix() {
        let table = tests_table(64);
        let index = table.index("owner_kind").unwrap();
        let integer = index.build_from_values(&[&json!("ann"), &json!(1)]).unwrap();
        let float = index.build_from_values(&[&json!("ann"), &json!(1.0)]).unwrap();
        let fraction = index.build_from_values(&[&json!("ann"), &json!(1.5)]).unwrap();
        assert_eq!(integer, float);
        assert_ne!(integer, fraction);
    }

    #[test]
    fn test_too_many_index_entries() {
        let table = tests_table(1);
        let err = table
            .new_document(b"k", &json!({"name": "a", "owner": "b", "kind": "c"}))
            .unwrap_err();
        assert!(matches!(err, StoreError::TooManyIndexes { count: 2, max: 1 }));
    }

    #[test]
    fn test_schemaless_table_skips_projection() {
        let table = Table::new("anything", None, 64);
        assert!(!table.has_indexes());
        // Scalars cannot be projected, but schemaless tables never try.
        let doc = table.new_document(b"k", &42u32).unwrap();
        assert!(doc.index_keys.is_empty());
        assert_eq!(codec::decode::<u32>(&doc.value).unwrap(), 42);
    }

    #[test]
    fn test_indexed_table_rejects_non_records() {
        let table = tests_table(64);
        assert!(matches!(
            table.new_document(b"k", &42u32),
            Err(StoreError::NotProjectable(_))
        ));
    }
}
