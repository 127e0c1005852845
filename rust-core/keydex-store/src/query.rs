// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request surface for list queries.
//
// A `Request` is a conjunction of predicates plus projection and
// pagination. It is built with chained options; operands that cannot be
// represented as field values are remembered and reported as a
// BadRequest when the request is executed.

use serde::Serialize;
use serde_json::Value;

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::key::Prefix;
use crate::table::{Index, Table};

/// Comparison operator of a [`Predicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Field equals the operand.
    Eq,
    /// Field is absent or differs from the operand.
    NotEq,
    /// Field orders strictly before the operand.
    Lt,
    /// Field orders strictly after the operand.
    Gt,
    /// String field starts with the operand.
    Prefix,
}

/// One `field op value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Column name.
    pub field: String,
    /// Operator.
    pub op: Op,
    /// Operand.
    pub value: Value,
}

/// A list query.
///
/// ```rust
/// use keydex_store::Request;
///
/// let request = Request::new().eq("count", &2).not_eq("name", "bar").page(1).limit(5);
/// assert_eq!(request.predicates().len(), 2);
/// assert_eq!(request.page_number(), Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    fields: Vec<String>,
    predicates: Vec<Predicate>,
    page: Option<usize>,
    limit: Option<usize>,
    index: Option<String>,
    rejected: Vec<String>,
}

impl Request {
    /// An empty request: every record, default page and limit.
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T: Serialize + ?Sized>(mut self, field: &str, op: Op, value: &T) -> Self {
        match codec::to_field_value(value) {
            Ok(value) => self.predicates.push(Predicate {
                field: field.to_string(),
                op,
                value,
            }),
            Err(err) => self.rejected.push(format!("{field}: {err}")),
        }
        self
    }

    /// `field == value`.
    pub fn eq<T: Serialize + ?Sized>(self, field: &str, value: &T) -> Self {
        self.with(field, Op::Eq, value)
    }

    /// `field != value`; absent fields match.
    pub fn not_eq<T: Serialize + ?Sized>(self, field: &str, value: &T) -> Self {
        self.with(field, Op::NotEq, value)
    }

    /// `field < value`.
    pub fn lt<T: Serialize + ?Sized>(self, field: &str, value: &T) -> Self {
        self.with(field, Op::Lt, value)
    }

    /// `field > value`.
    pub fn gt<T: Serialize + ?Sized>(self, field: &str, value: &T) -> Self {
        self.with(field, Op::Gt, value)
    }

    /// `field` starts with `prefix`.
    pub fn px(self, field: &str, prefix: &str) -> Self {
        self.with(field, Op::Prefix, prefix)
    }

    /// Zero-based page number.
    pub fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    /// Maximum items per page.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict returned records to these fields.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Iterate this index. Every column of it must be pinned by `eq`.
    pub fn index(mut self, name: &str) -> Self {
        self.index = Some(name.to_string());
        self
    }

    /// The predicates, in insertion order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Projected fields; empty means every field.
    pub fn projection(&self) -> &[String] {
        &self.fields
    }

    /// The requested page, if set.
    pub fn page_number(&self) -> Option<usize> {
        self.page
    }

    /// The requested limit, if set.
    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// The first `eq` operand pinned on `field`.
    pub fn pinned(&self, field: &str) -> Option<&Value> {
        self.predicates
            .iter()
            .find(|p| p.op == Op::Eq && p.field == field && !p.value.is_null())
            .map(|p| &p.value)
    }

    /// Fail with BadRequest if any operand was rejected while building.
    pub fn validate(&self) -> StoreResult<()> {
        if self.rejected.is_empty() {
            Ok(())
        } else {
            Err(StoreError::BadRequest(self.rejected.join("; ")))
        }
    }

    /// Resolve page and limit against the store default.
    pub(crate) fn window(&self, default_limit: usize) -> StoreResult<(usize, usize)> {
        let limit = self.limit.unwrap_or(default_limit);
        if limit == 0 {
            return Err(StoreError::BadRequest("limit must be at least 1".to_string()));
        }
        let page = self.page.unwrap_or(crate::config::DEFAULT_PAGE);
        let skip = page
            .checked_mul(limit)
            .ok_or_else(|| StoreError::BadRequest(format!("page {page} is out of range")))?;
        Ok((skip, limit))
    }

    /// Pick the index range to iterate, if any.
    ///
    /// A named index must be fully pinned. Otherwise the fully pinned index
    /// with the most columns wins, ties going to the first by name.
    pub fn select_index<'t>(&self, table: &'t Table) -> StoreResult<Option<(&'t Index, Prefix)>> {
        if let Some(name) = &self.index {
            let index = table.index(name).ok_or_else(|| {
                StoreError::BadRequest(format!(
                    "table '{}' has no index '{name}'",
                    table.name()
                ))
            })?;
            return match self.pinned_values(index) {
                Some(values) => Ok(Some((index, index.build_from_values(&values)?))),
                None => Err(StoreError::BadRequest(format!(
                    "index '{name}' needs an eq predicate on every column of {:?}",
                    index.columns()
                ))),
            };
        }

        let mut best: Option<(&Index, Vec<&Value>)> = None;
        for index in table.indexes() {
            if let Some(values) = self.pinned_values(index) {
                let wider = best
                    .as_ref()
                    .map_or(true, |(current, _)| index.columns().len() > current.columns().len());
                if wider {
                    best = Some((index, values));
                }
            }
        }
        match best {
            Some((index, values)) => Ok(Some((index, index.build_from_values(&values)?))),
            None => Ok(None),
        }
    }

    fn pinned_values(&self, index: &Index) -> Option<Vec<&Value>> {
        index
            .columns()
            .iter()
            .map(|column| self.pinned(column))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn table() -> Table {
        let schema = Schema::builder()
            .index("tests", "count", ["count"])
            .index("tests", "name", ["name"])
            .index("tests", "name_count", ["name", "count"])
            .build()
            .unwrap();
        Table::new("tests", schema.indexes("tests"), 64)
    }

    #[test]
    fn test_builder_collects_predicates() {
        let request = Request::new()
            .eq("name", "bar")
            .lt("count", &5)
            .gt("count", &1)
            .not_eq("kind", "x")
            .px("title", "intro")
            .fields(["name"]);
        let ops: Vec<Op> = request.predicates().iter().map(|p| p.op).collect();
        assert_eq!(ops, vec![Op::Eq, Op::Lt, Op::Gt, Op::NotEq, Op::Prefix]);
        assert_eq!(request.projection(), ["name"]);
        assert_eq!(request.pinned("name"), Some(&json!("bar")));
        assert_eq!(request.pinned("count"), None);
        request.validate().unwrap();
    }

    #[test]
    fn test_unsupported_operand_is_bad_request() {
        // Maps with non-string keys have no field-value representation.
        let mut weird = BTreeMap::new();
        weird.insert(vec![1u8], 2u8);
        let request = Request::new().eq("field", &weird);
        assert!(request.predicates().is_empty());
        assert!(matches!(request.validate(), Err(StoreError::BadRequest(_))));
    }

    #[test]
    fn test_window_defaults_and_bounds() {
        assert_eq!(Request::new().window(10).unwrap(), (0, 10));
        assert_eq!(Request::new().page(3).limit(4).window(10).unwrap(), (12, 4));
        assert!(matches!(
            Request::new().limit(0).window(10),
            Err(StoreError::BadRequest(_))
        ));
        assert!(matches!(
            Request::new().page(usize::MAX).limit(2).window(10),
            Err(StoreError::BadRequest(_))
        ));
    }

    #[test]
    fn test_select_prefers_widest_pinned_index() {
        let table = table();
        let request = Request::new().eq("name", "bar").eq("count", &2);
        let (index, prefix) = request.select_index(&table).unwrap().unwrap();
        assert_eq!(index.name(), "name_count");
        assert_eq!(
            prefix,
            index.build_from_values(&[&json!("bar"), &json!(2)]).unwrap()
        );
    }

    #[test]
    fn test_select_single_column_index() {
        let table = table();
        let (index, _) = Request::new()
            .eq("count", &1)
            .select_index(&table)
            .unwrap()
            .unwrap();
        assert_eq!(index.name(), "count");
    }

    #[test]
    fn test_select_falls_back_to_scan() {
        let table = table();
        assert!(Request::new().select_index(&table).unwrap().is_none());
        assert!(Request::new()
            .gt("count", &1)
            .not_eq("name", "bar")
            .select_index(&table)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_named_index_must_be_pinned() {
        let table = table();
        let request = Request::new().eq("name", "bar").index("name_count");
        assert!(matches!(
            request.select_index(&table),
            Err(StoreError::BadRequest(_))
        ));
        let request = Request::new().eq("name", "bar").eq("count", &1).index("name");
        let (index, _) = request.select_index(&table).unwrap().unwrap();
        assert_eq!(index.name(), "name");
        assert!(matches!(
            Request::new().index("nope").select_index(&table),
            Err(StoreError::BadRequest(_))
        ));
    }
}
