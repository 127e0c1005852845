// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Predicate evaluation against a projected record.
//
// All predicates must hold. Absent (or null) fields fail Eq, Lt, Gt and
// Prefix and satisfy NotEq. Ordering is only defined between two numbers,
// two strings or two booleans; any other pairing is reported as
// Incomparable rather than silently treated as a miss.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::codec::{self, FieldMap};
use crate::error::{StoreError, StoreResult};
use crate::query::{Op, Predicate};

/// Evaluate every predicate against `fields`.
pub fn matches(fields: &FieldMap, predicates: &[Predicate]) -> StoreResult<bool> {
    for predicate in predicates {
        if !evaluate(fields, predicate)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluate one predicate.
pub fn evaluate(fields: &FieldMap, predicate: &Predicate) -> StoreResult<bool> {
    let operand = &predicate.value;
    let Some(actual) = codec::field(fields, &predicate.field) else {
        if predicate.op == Op::Prefix && !operand.is_string() {
            return Err(incomparable(predicate, operand, operand));
        }
        return Ok(predicate.op == Op::NotEq);
    };

    match predicate.op {
        Op::Eq => Ok(equal(actual, operand)),
        Op::NotEq => Ok(!equal(actual, operand)),
        Op::Lt => Ok(order(predicate, actual, operand)? == Ordering::Less),
        Op::Gt => Ok(order(predicate, actual, operand)? == Ordering::Greater),
        Op::Prefix => {
            let Value::String(prefix) = operand else {
                return Err(incomparable(predicate, actual, operand));
            };
            Ok(actual.as_str().is_some_and(|s| s.starts_with(prefix.as_str())))
        }
    }
}

// Same notion of equality the index prefixes hash by.
fn equal(actual: &Value, operand: &Value) -> bool {
    match (actual, operand) {
        (Value::Number(_), Value::Number(_))
        | (Value::Array(_), Value::Array(_))
        | (Value::Object(_), Value::Object(_)) => codec::canonical(actual) == codec::canonical(operand),
        _ => actual == operand,
    }
}

fn order(predicate: &Predicate, actual: &Value, operand: &Value) -> StoreResult<Ordering> {
    match (actual, operand) {
        (Value::Number(a), Value::Number(b)) => Ok(compare_numbers(a, b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        _ => Err(incomparable(predicate, actual, operand)),
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a.cmp(&b);
    }
    let a = a.as_f64().unwrap_or(f64::NAN);
    let b = b.as_f64().unwrap_or(f64::NAN);
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn incomparable(predicate: &Predicate, actual: &Value, operand: &Value) -> StoreError {
    StoreError::Incomparable {
        field: predicate.field.clone(),
        detail: format!(
            "{:?} of {} against {}",
            predicate.op,
            codec::kind_of(actual),
            codec::kind_of(operand)
        ),
    }
}
