// SPDX-License-Identifier: PMPL-1.0-or-later
//! Schema registry.
//!
//! A schema maps table names to named secondary indexes, each an ordered
//! list of column names. It is fixed when the store is constructed. An
//! empty schema puts the store in schemaless mode: every table name is
//! valid and has no indexes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Index name to ordered column list.
pub type IndexDefs = BTreeMap<String, Vec<String>>;

/// Table name to index definitions.
///
/// Serializes as a plain nested JSON object:
///
/// ```json
/// { "tests": { "name": ["name"], "by_owner_kind": ["owner", "kind"] } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    tables: BTreeMap<String, IndexDefs>,
}

impl Schema {
    /// Build a validated schema from raw definitions.
    pub fn new(tables: BTreeMap<String, IndexDefs>) -> StoreResult<Self> {
        let schema = Self { tables };
        schema.validate()?;
        Ok(schema)
    }

    /// Start building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Whether no table is declared (schemaless mode).
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Declared table names, sorted.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Index definitions of `table`, if declared.
    pub fn indexes(&self, table: &str) -> Option<&IndexDefs> {
        self.tables.get(table)
    }

    /// Check every index: a non-empty table name, a non-empty index name,
    /// at least one column, and no column repeated within one index.
    pub fn validate(&self) -> StoreResult<()> {
        for (table, indexes) in &self.tables {
            if table.is_empty() {
                return Err(StoreError::Schema("empty table name".to_string()));
            }
            for (index, columns) in indexes {
                if index.is_empty() {
                    return Err(StoreError::Schema(format!(
                        "table '{table}' has an index with an empty name"
                    )));
                }
                if columns.is_empty() {
                    return Err(StoreError::Schema(format!(
                        "index '{table}.{index}' has no columns"
                    )));
                }
                let mut seen = BTreeSet::new();
                for column in columns {
                    if !seen.insert(column.as_str()) {
                        return Err(StoreError::Schema(format!(
                            "index '{table}.{index}' repeats column '{column}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`Schema`].
///
/// ```rust
/// use keydex_store::Schema;
///
/// let schema = Schema::builder()
///     .index("tests", "name", ["name"])
///     .table("audit")
///     .build()
///     .unwrap();
/// assert_eq!(schema.table_names().collect::<Vec<_>>(), vec!["audit", "tests"]);
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: BTreeMap<String, IndexDefs>,
}

impl SchemaBuilder {
    /// Declare a table without indexes (a no-op if already declared).
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.tables.entry(table.into()).or_default();
        self
    }

    /// Declare an index on `table`, declaring the table if needed.
    pub fn index<I, C>(mut self, table: impl Into<String>, index: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.tables
            .entry(table.into())
            .or_default()
            .insert(index.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    /// Validate and finish.
    pub fn build(self) -> StoreResult<Schema> {
        Schema::new(self.tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let schema = Schema::builder()
            .index("tests", "name", ["name"])
            .index("tests", "owner_kind", ["owner", "kind"])
            .build()
            .unwrap();
        let indexes = schema.indexes("tests").unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes["owner_kind"], vec!["owner", "kind"]);
        assert!(schema.indexes("missing").is_none());
        assert!(!schema.is_empty());
    }

    #[test]
    fn test_from_json() {
        let schema: Schema =
            serde_json::from_str(r#"{"tests": {"name": ["name"]}, "plain": {}}"#).unwrap();
        schema.validate().unwrap();
        assert_eq!(schema.table_names().collect::<Vec<_>>(), vec!["plain", "tests"]);
        assert!(schema.indexes("plain").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_empty_column_list() {
        let err = Schema::builder()
            .index("tests", "nothing", Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema(msg) if msg.contains("no columns")));
    }

    #[test]
    fn test_rejects_repeated_column() {
        let err = Schema::builder()
            .index("tests", "dup", ["a", "a"])
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema(msg) if msg.contains("repeats")));
    }

    #[test]
    fn test_empty_schema_is_schemaless() {
        assert!(Schema::default().is_empty());
        Schema::default().validate().unwrap();
    }
}
